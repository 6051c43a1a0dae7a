//! Non-owning handles to externally owned GPU objects.
//!
//! A [`ResourceHandle`] never keeps its target alive. It is either bound to
//! a single object ([`ResourceHandle::fixed`]) or to a fixed-size set of
//! per-slot objects selected through a shared [`IndexProvider`]
//! ([`ResourceHandle::indexed`]). The same handle therefore resolves to a
//! different object every time the provider's index changes, without being
//! rebuilt.
//!
//! Resolution goes through [`ResourceHandle::get`], which reports a missing
//! binding, a dropped target or an unset index as a [`TaskError`] instead of
//! touching freed memory.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{TaskError, Unresolved};
use crate::provider::{IndexProvider, ProviderId};

/// Integer types usable as a slot index.
pub trait SlotIndex: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn to_usize(self) -> usize;

    /// Returns `None` when `value` does not fit in `Self`.
    fn from_usize(value: usize) -> Option<Self>;
}

macro_rules! impl_slot_index {
    ($($ty:ty),*) => {
        $(
            impl SlotIndex for $ty {
                #[inline]
                fn to_usize(self) -> usize {
                    self as usize
                }

                #[inline]
                fn from_usize(value: usize) -> Option<Self> {
                    <$ty>::try_from(value).ok()
                }
            }
        )*
    };
}

impl_slot_index!(u8, u16, u32, u64, usize);

/// A non-owning reference to one object.
///
/// Exists so slot collections can be built from `&Arc<T>`, `Weak<T>` or
/// `&Weak<T>` alike.
pub struct ResourceRef<T>(Weak<T>);

impl<T> ResourceRef<T> {
    pub fn into_weak(self) -> Weak<T> {
        self.0
    }
}

impl<T> From<&Arc<T>> for ResourceRef<T> {
    fn from(value: &Arc<T>) -> Self {
        Self(Arc::downgrade(value))
    }
}

impl<T> From<Weak<T>> for ResourceRef<T> {
    fn from(value: Weak<T>) -> Self {
        Self(value)
    }
}

impl<T> From<&Weak<T>> for ResourceRef<T> {
    fn from(value: &Weak<T>) -> Self {
        Self(value.clone())
    }
}

/// Compile-time view of a handle, used by graph validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
    Unbound,
    Fixed {
        alive: bool,
    },
    Indexed {
        provider: ProviderId,
        range: usize,
        slots: usize,
        live: usize,
    },
}

/// Typed, non-owning handle to an externally owned object.
pub enum ResourceHandle<T, I: SlotIndex = u32> {
    /// Not bound to anything.
    Unbound,
    /// Bound to one object for the handle's whole lifetime.
    Fixed(Weak<T>),
    /// Bound to one object per slot; the provider selects the current slot.
    Indexed {
        slots: Arc<[Weak<T>]>,
        index: IndexProvider<I>,
    },
}

impl<T, I: SlotIndex> ResourceHandle<T, I> {
    /// Bind to a single object.
    pub fn fixed(target: impl Into<ResourceRef<T>>) -> Self {
        Self::Fixed(target.into().into_weak())
    }

    /// Bind to one object per slot, selected by `index`.
    ///
    /// The number of slots is fixed here. Graph compilation rejects a handle
    /// whose slot count differs from the provider's range.
    pub fn indexed<R>(slots: impl IntoIterator<Item = R>, index: &IndexProvider<I>) -> Self
    where
        R: Into<ResourceRef<T>>,
    {
        let slots: Vec<Weak<T>> = slots.into_iter().map(|r| r.into().into_weak()).collect();
        Self::Indexed {
            slots: slots.into(),
            index: index.clone(),
        }
    }

    /// A handle bound to nothing.
    pub fn unbound() -> Self {
        Self::Unbound
    }

    /// True iff no target object is reachable.
    ///
    /// Indexed handles keep one `Weak` per slot, so this checks every slot
    /// and costs O(slots) rather than O(1).
    pub fn empty(&self) -> bool {
        match self {
            Self::Unbound => true,
            Self::Fixed(target) => target.strong_count() == 0,
            Self::Indexed { slots, .. } => slots.iter().all(|slot| slot.strong_count() == 0),
        }
    }

    /// True unless the handle is [`Unbound`](Self::Unbound).
    pub fn is_bound(&self) -> bool {
        !matches!(self, Self::Unbound)
    }

    /// Resolve the handle to its current target.
    ///
    /// # Errors
    ///
    /// - [`TaskError::ResourceUnresolved`] if the handle is unbound, its
    ///   target was dropped, or its index has not been set yet.
    /// - [`TaskError::SlotOutOfRange`] if the index exceeds the slot count.
    pub fn get(&self) -> Result<Arc<T>, TaskError> {
        match self {
            Self::Unbound => Err(Unresolved::Unbound.into()),
            Self::Fixed(target) => target
                .upgrade()
                .ok_or(TaskError::ResourceUnresolved(Unresolved::Dropped)),
            Self::Indexed { slots, index } => {
                let current = index.value()?.to_usize();
                let slot = slots.get(current).ok_or(TaskError::SlotOutOfRange {
                    index: current,
                    len: slots.len(),
                })?;
                slot.upgrade()
                    .ok_or(TaskError::ResourceUnresolved(Unresolved::Dropped))
            }
        }
    }

    /// Number of targets: 0 when unbound, 1 when fixed, the slots when indexed.
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Unbound => 0,
            Self::Fixed(_) => 1,
            Self::Indexed { slots, .. } => slots.len(),
        }
    }

    /// Id of the provider selecting the slot, for indexed handles.
    pub fn index_provider_id(&self) -> Option<ProviderId> {
        match self {
            Self::Indexed { index, .. } => Some(index.id()),
            _ => None,
        }
    }

    /// True if both handles are bound to the same targets (and provider).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unbound, Self::Unbound) => true,
            (Self::Fixed(a), Self::Fixed(b)) => Weak::ptr_eq(a, b),
            (
                Self::Indexed { slots: a, index: ia },
                Self::Indexed { slots: b, index: ib },
            ) => ia.id() == ib.id() && Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Snapshot of the binding used by graph validation.
    pub fn binding_state(&self) -> BindingState {
        match self {
            Self::Unbound => BindingState::Unbound,
            Self::Fixed(target) => BindingState::Fixed {
                alive: target.strong_count() > 0,
            },
            Self::Indexed { slots, index } => BindingState::Indexed {
                provider: index.id(),
                range: index.range(),
                slots: slots.len(),
                live: slots.iter().filter(|slot| slot.strong_count() > 0).count(),
            },
        }
    }
}

impl<T, I: SlotIndex> Default for ResourceHandle<T, I> {
    fn default() -> Self {
        Self::Unbound
    }
}

impl<T, I: SlotIndex> Clone for ResourceHandle<T, I> {
    fn clone(&self) -> Self {
        match self {
            Self::Unbound => Self::Unbound,
            Self::Fixed(target) => Self::Fixed(target.clone()),
            Self::Indexed { slots, index } => Self::Indexed {
                slots: Arc::clone(slots),
                index: index.clone(),
            },
        }
    }
}

impl<T, I: SlotIndex> fmt::Debug for ResourceHandle<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => f.write_str("Unbound"),
            Self::Fixed(target) => f
                .debug_struct("Fixed")
                .field("alive", &(target.strong_count() > 0))
                .finish(),
            Self::Indexed { slots, index } => f
                .debug_struct("Indexed")
                .field("slots", &slots.len())
                .field("index", index)
                .finish(),
        }
    }
}

impl<T, I: SlotIndex> From<&Arc<T>> for ResourceHandle<T, I> {
    fn from(target: &Arc<T>) -> Self {
        Self::fixed(target)
    }
}
