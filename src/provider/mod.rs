//! Shared per-frame state: the current slot index and the resources it selects.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::Backend;
use crate::error::{GraphError, TaskError, Unresolved};
use crate::resource::{ResourceHandle, ResourceRef, SlotIndex};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of an [`IndexProvider`], shared by all of its clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    fn next() -> Self {
        Self(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider#{}", self.0)
    }
}

struct IndexSlot {
    id: ProviderId,
    range: usize,
    // 0 = unset, otherwise index + 1
    value: AtomicU64,
}

/// The current frame slot, shared between the task that writes it and the
/// handles that read it.
///
/// Cloning shares the value. Writes happen once per cycle from a single
/// task, so the slot is a plain atomic.
pub struct IndexProvider<I: SlotIndex = u32> {
    inner: Arc<IndexSlot>,
    _marker: PhantomData<fn() -> I>,
}

impl<I: SlotIndex> IndexProvider<I> {
    /// Create an unset provider for indices in `[0, range)`.
    ///
    /// # Panics
    ///
    /// Panics if `range` is 0 or if `range - 1` does not fit in `I`.
    pub fn new(range: usize) -> Self {
        assert!(range > 0, "index provider range must be at least 1");
        assert!(
            I::from_usize(range - 1).is_some(),
            "index provider range {range} does not fit the index type"
        );
        Self {
            inner: Arc::new(IndexSlot {
                id: ProviderId::next(),
                range,
                value: AtomicU64::new(0),
            }),
            _marker: PhantomData,
        }
    }

    /// Unique id of this provider; clones share it.
    pub fn id(&self) -> ProviderId {
        self.inner.id
    }

    /// Number of slots the index cycles through.
    pub fn range(&self) -> usize {
        self.inner.range
    }

    /// Current index, or `None` if nothing has been written yet.
    pub fn get(&self) -> Option<I> {
        match self.inner.value.load(Ordering::Acquire) {
            0 => None,
            stored => I::from_usize((stored - 1) as usize),
        }
    }

    /// Current index.
    ///
    /// # Errors
    ///
    /// Returns `ResourceUnresolved(IndexUnset)` if nothing has been written yet.
    pub fn value(&self) -> Result<I, TaskError> {
        self.get()
            .ok_or(TaskError::ResourceUnresolved(Unresolved::IndexUnset))
    }

    /// True once an index has been written.
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    /// Write the current index. There is no wraparound.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::SlotOutOfRange`] if `index >= range`; the stored
    /// value is left unchanged.
    pub fn set(&self, index: I) -> Result<(), TaskError> {
        let index = index.to_usize();
        if index >= self.inner.range {
            return Err(TaskError::SlotOutOfRange {
                index,
                len: self.inner.range,
            });
        }
        self.inner.value.store(index as u64 + 1, Ordering::Release);
        log::trace!("{}: slot index set to {}", self.inner.id, index);
        Ok(())
    }

    /// Step to the next slot: unset becomes 0, `i` becomes `(i + 1) % range`.
    pub fn advance(&self) -> Result<I, TaskError> {
        let next = match self.get() {
            None => 0,
            Some(current) => (current.to_usize() + 1) % self.inner.range,
        };
        let next = I::from_usize(next).ok_or(TaskError::SlotOutOfRange {
            index: next,
            len: self.inner.range,
        })?;
        self.set(next)?;
        Ok(next)
    }

    /// Forget the current index, e.g. after the surface was rebuilt.
    pub fn reset(&self) {
        self.inner.value.store(0, Ordering::Release);
        log::trace!("{}: slot index reset", self.inner.id);
    }

    /// True if both values share the same index state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<I: SlotIndex> Clone for IndexProvider<I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _marker: PhantomData,
        }
    }
}

impl<I: SlotIndex> fmt::Debug for IndexProvider<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexProvider")
            .field("id", &self.inner.id)
            .field("range", &self.inner.range)
            .field("value", &self.get())
            .finish()
    }
}

/// "The resource for the current frame": one object per slot, selected by
/// an [`IndexProvider`].
///
/// Converts into a [`ResourceHandle`], so tasks accept providers and raw
/// handles alike.
pub struct ResourceProvider<T, I: SlotIndex = u32> {
    handle: ResourceHandle<T, I>,
    index: IndexProvider<I>,
}

impl<T, I: SlotIndex> ResourceProvider<T, I> {
    /// Bind one resource per slot, selected by `index`.
    pub fn new<R>(slots: impl IntoIterator<Item = R>, index: &IndexProvider<I>) -> Self
    where
        R: Into<ResourceRef<T>>,
    {
        Self {
            handle: ResourceHandle::indexed(slots, index),
            index: index.clone(),
        }
    }

    /// Resolve the resource for the current slot.
    pub fn get(&self) -> Result<Arc<T>, TaskError> {
        self.handle.get()
    }

    /// True iff no slot's resource is alive.
    pub fn empty(&self) -> bool {
        self.handle.empty()
    }

    /// Provider selecting the current slot.
    pub fn index(&self) -> &IndexProvider<I> {
        &self.index
    }

    /// Slot selected right now, if the index is set.
    pub fn current_slot(&self) -> Option<I> {
        self.index.get()
    }

    /// Number of slots.
    pub fn slot_count(&self) -> usize {
        self.handle.slot_count()
    }

    /// A handle sharing this provider's slots and index.
    pub fn handle(&self) -> ResourceHandle<T, I> {
        self.handle.clone()
    }
}

impl<T, I: SlotIndex> Clone for ResourceProvider<T, I> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            index: self.index.clone(),
        }
    }
}

impl<T, I: SlotIndex> fmt::Debug for ResourceProvider<T, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceProvider")
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T, I: SlotIndex> From<ResourceProvider<T, I>> for ResourceHandle<T, I> {
    fn from(provider: ResourceProvider<T, I>) -> Self {
        provider.handle
    }
}

impl<T, I: SlotIndex> From<&ResourceProvider<T, I>> for ResourceHandle<T, I> {
    fn from(provider: &ResourceProvider<T, I>) -> Self {
        provider.handle()
    }
}

/// Per-slot command buffers with their "render finished" semaphores and
/// "in flight" fences.
///
/// All objects are owned by the caller; the provider only selects them
/// through one shared index. The index counts frames in flight, which is
/// usually independent of the surface image index written by an acquire.
pub struct CommandBufferProvider<B: Backend> {
    index: IndexProvider<u32>,
    command_buffers: ResourceProvider<B::CommandBuffer>,
    semaphores: ResourceProvider<B::Semaphore>,
    fences: ResourceProvider<B::Fence>,
}

impl<B: Backend> CommandBufferProvider<B> {
    /// # Errors
    ///
    /// Returns [`GraphError::SlotCountMismatch`] if any collection's length
    /// differs from `index.range()`.
    pub fn new(
        index: &IndexProvider<u32>,
        command_buffers: &[Arc<B::CommandBuffer>],
        semaphores: &[Arc<B::Semaphore>],
        fences: &[Arc<B::Fence>],
    ) -> Result<Self, GraphError> {
        let range = index.range();
        for (resource, slots) in [
            ("command buffers", command_buffers.len()),
            ("render finished semaphores", semaphores.len()),
            ("in flight fences", fences.len()),
        ] {
            if slots != range {
                return Err(GraphError::SlotCountMismatch {
                    resource: resource.to_string(),
                    slots,
                    range,
                });
            }
        }

        Ok(Self {
            index: index.clone(),
            command_buffers: ResourceProvider::new(command_buffers, index),
            semaphores: ResourceProvider::new(semaphores, index),
            fences: ResourceProvider::new(fences, index),
        })
    }

    /// Provider selecting the frame slot.
    pub fn index(&self) -> &IndexProvider<u32> {
        &self.index
    }

    /// Number of frame slots.
    pub fn slot_count(&self) -> usize {
        self.index.range()
    }

    /// Move to the next frame slot.
    pub fn advance(&self) -> Result<u32, TaskError> {
        self.index.advance()
    }

    /// Handle to the current slot's command buffer.
    pub fn command_buffer(&self) -> ResourceHandle<B::CommandBuffer> {
        self.command_buffers.handle()
    }

    /// Handle to the current slot's render finished semaphore.
    pub fn semaphore(&self) -> ResourceHandle<B::Semaphore> {
        self.semaphores.handle()
    }

    /// Handle to the current slot's in flight fence.
    pub fn fence(&self) -> ResourceHandle<B::Fence> {
        self.fences.handle()
    }

    /// Resolve the current slot's command buffer now.
    pub fn current_command_buffer(&self) -> Result<Arc<B::CommandBuffer>, TaskError> {
        self.command_buffers.get()
    }
}

impl<B: Backend> Clone for CommandBufferProvider<B> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
            command_buffers: self.command_buffers.clone(),
            semaphores: self.semaphores.clone(),
            fences: self.fences.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for CommandBufferProvider<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBufferProvider")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
