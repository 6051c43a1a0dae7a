//! Pipeline tasks.
//!
//! A [`Task`] is one step of the per-frame pipeline. The set of task kinds is
//! closed, so tasks are a plain enum with a single [`Task::execute`] entry
//! point. Tasks are built once and executed every cycle; the only state that
//! changes between cycles lives behind the handles and providers they hold.

mod acquire;
mod fence;
mod present;
mod render;
mod submit;

pub use acquire::AcquireTask;
pub use fence::{FenceAction, FenceTask};
pub use present::PresentTask;
pub use render::{CustomTask, RenderContext, RenderTask};
pub use submit::SubmitTask;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::Backend;
use crate::config::TaskGraphConfig;
use crate::error::TaskError;
use crate::provider::ProviderId;
use crate::resource::{BindingState, ResourceHandle};

/// Stable tag identifying what a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Acquire,
    Render,
    Custom,
    Submit,
    Present,
    Fence,
}

impl TaskKind {
    /// Short lowercase name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Render => "render",
            Self::Custom => "custom",
            Self::Submit => "submit",
            Self::Present => "present",
            Self::Fence => "fence",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// Synchronization roles a task plays in the graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Signals a semaphore that downstream tasks can wait on.
        const SIGNAL_SEMAPHORE = 1 << 0;
        /// Can wait on semaphores signalled upstream.
        const AWAIT_SEMAPHORE = 1 << 1;
        /// Writes the current slot index of an index provider.
        const WRITE_INDEX = 1 << 2;
    }
}

/// Per-cycle context passed to every task.
pub struct FrameContext<'a, B: Backend> {
    pub device: &'a B,
    pub config: &'a TaskGraphConfig,
    /// Number of the cycle being executed, starting at 1.
    pub frame: u64,
}

/// A resource a task refers to, as seen by graph validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub label: String,
    /// Optional bindings may be left unbound.
    pub required: bool,
    pub state: BindingState,
}

impl Binding {
    fn of<T>(label: impl Into<String>, required: bool, handle: &ResourceHandle<T>) -> Self {
        Self {
            label: label.into(),
            required,
            state: handle.binding_state(),
        }
    }
}

/// Resolve a handle that may legitimately be left unbound.
fn resolve_optional<T>(handle: &ResourceHandle<T>) -> Result<Option<Arc<T>>, TaskError> {
    if handle.is_bound() {
        handle.get().map(Some)
    } else {
        Ok(None)
    }
}

fn resolve_all<T>(handles: &[ResourceHandle<T>]) -> Result<Vec<Arc<T>>, TaskError> {
    handles.iter().map(ResourceHandle::get).collect()
}

/// A unit of pipeline work.
pub enum Task<B: Backend> {
    Acquire(AcquireTask<B>),
    Render(RenderTask<B>),
    Custom(CustomTask<B>),
    Submit(SubmitTask<B>),
    Present(PresentTask<B>),
    Fence(FenceTask<B>),
}

impl<B: Backend> Task<B> {
    pub fn name(&self) -> &str {
        match self {
            Self::Acquire(task) => task.name(),
            Self::Render(task) => task.name(),
            Self::Custom(task) => task.name(),
            Self::Submit(task) => task.name(),
            Self::Present(task) => task.name(),
            Self::Fence(task) => task.name(),
        }
    }

    /// Which kind of task this is.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Acquire(_) => TaskKind::Acquire,
            Self::Render(_) => TaskKind::Render,
            Self::Custom(_) => TaskKind::Custom,
            Self::Submit(_) => TaskKind::Submit,
            Self::Present(_) => TaskKind::Present,
            Self::Fence(_) => TaskKind::Fence,
        }
    }

    /// Synchronisation roles the task can take in the graph.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Acquire(task) => {
                let mut caps = Capabilities::WRITE_INDEX;
                caps.set(Capabilities::SIGNAL_SEMAPHORE, task.signal().is_bound());
                caps
            }
            Self::Submit(task) => {
                let mut caps = Capabilities::AWAIT_SEMAPHORE;
                caps.set(Capabilities::SIGNAL_SEMAPHORE, task.signal().is_bound());
                caps
            }
            Self::Present(_) => Capabilities::AWAIT_SEMAPHORE,
            Self::Render(_) | Self::Custom(_) | Self::Fence(_) => Capabilities::empty(),
        }
    }

    /// Every resource this task refers to.
    pub fn bindings(&self) -> Vec<Binding> {
        match self {
            Self::Acquire(task) => task.bindings(),
            Self::Render(task) => task.bindings(),
            Self::Custom(_) => Vec::new(),
            Self::Submit(task) => task.bindings(),
            Self::Present(task) => task.bindings(),
            Self::Fence(task) => task.bindings(),
        }
    }

    /// Index providers the task reads or writes directly.
    pub fn index_providers(&self) -> Vec<(&'static str, ProviderId)> {
        match self {
            Self::Acquire(task) => vec![("index", task.index().id())],
            Self::Render(task) => task
                .index()
                .map(|index| ("index", index.id()))
                .into_iter()
                .collect(),
            Self::Present(task) => vec![("index", task.index().id())],
            Self::Custom(_) | Self::Submit(_) | Self::Fence(_) => Vec::new(),
        }
    }

    /// Provider written by this task, if any.
    pub fn written_index(&self) -> Option<ProviderId> {
        match self {
            Self::Acquire(task) => Some(task.index().id()),
            _ => None,
        }
    }

    /// Semaphore signalled for downstream tasks, if any.
    pub fn signal_semaphore(&self) -> Option<&ResourceHandle<B::Semaphore>> {
        let signal = match self {
            Self::Acquire(task) => task.signal(),
            Self::Submit(task) => task.signal(),
            _ => return None,
        };
        signal.is_bound().then_some(signal)
    }

    /// Semaphores this task waits on because of graph edges.
    pub fn derived_waits(&self) -> &[ResourceHandle<B::Semaphore>] {
        match self {
            Self::Submit(task) => task.derived_waits(),
            Self::Present(task) => task.derived_waits(),
            _ => &[],
        }
    }

    /// Add a wait derived from the graph. Ignored by tasks that cannot wait,
    /// and for semaphores the task already waits on.
    pub(crate) fn add_derived_wait(&mut self, semaphore: ResourceHandle<B::Semaphore>) -> bool {
        let (explicit, derived) = match self {
            Self::Submit(task) => task.waits_mut(),
            Self::Present(task) => task.waits_mut(),
            _ => return false,
        };
        if explicit.iter().chain(derived.iter()).any(|w| w.ptr_eq(&semaphore)) {
            return false;
        }
        derived.push(semaphore);
        true
    }

    /// Run the task for one cycle.
    pub fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        match self {
            Self::Acquire(task) => task.execute(ctx),
            Self::Render(task) => task.execute(ctx),
            Self::Custom(task) => task.execute(ctx),
            Self::Submit(task) => task.execute(ctx),
            Self::Present(task) => task.execute(ctx),
            Self::Fence(task) => task.execute(ctx),
        }
    }
}

impl<B: Backend> Clone for Task<B> {
    fn clone(&self) -> Self {
        match self {
            Self::Acquire(task) => Self::Acquire(task.clone()),
            Self::Render(task) => Self::Render(task.clone()),
            Self::Custom(task) => Self::Custom(task.clone()),
            Self::Submit(task) => Self::Submit(task.clone()),
            Self::Present(task) => Self::Present(task.clone()),
            Self::Fence(task) => Self::Fence(task.clone()),
        }
    }
}

impl<B: Backend> fmt::Debug for Task<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

macro_rules! impl_into_task {
    ($($variant:ident($ty:ident)),*) => {
        $(
            impl<B: Backend> From<$ty<B>> for Task<B> {
                fn from(task: $ty<B>) -> Self {
                    Self::$variant(task)
                }
            }
        )*
    };
}

impl_into_task!(
    Acquire(AcquireTask),
    Render(RenderTask),
    Custom(CustomTask),
    Submit(SubmitTask),
    Present(PresentTask),
    Fence(FenceTask)
);
