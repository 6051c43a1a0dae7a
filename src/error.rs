//! Error types for task execution and graph compilation.

use thiserror::Error;

use crate::graph::TaskId;

/// Why a resource handle could not be resolved.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    /// The handle was never bound to anything.
    #[error("handle is not bound")]
    Unbound,
    /// The externally owned object behind the handle has been dropped.
    #[error("referenced object was dropped")]
    Dropped,
    /// The shared slot index has not been written since the pipeline started.
    #[error("slot index has not been set")]
    IndexUnset,
}

/// Errors returned by a task, and therefore by one execution cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// A handle the task needs could not be resolved.
    #[error("resource unresolved: {0}")]
    ResourceUnresolved(Unresolved),
    /// The current slot index points past the handle's slots.
    #[error("slot index {index} is out of range for {len} slots")]
    SlotOutOfRange { index: usize, len: usize },
    /// The surface must be rebuilt before images can be acquired or presented.
    #[error("presentation surface is out of date")]
    SurfaceOutOfDate,
    /// A bounded wait expired; names what was waited on.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// The device was lost.
    #[error("device lost")]
    DeviceLost,
    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
    /// A render or custom callback reported a failure.
    #[error("task callback failed: {0}")]
    Callback(String),
}

impl TaskError {
    /// True for failures the caller can recover from by rebuilding
    /// surface-bound state (or simply retrying) before the next cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SurfaceOutOfDate | Self::Timeout(_))
    }
}

impl From<Unresolved> for TaskError {
    fn from(reason: Unresolved) -> Self {
        Self::ResourceUnresolved(reason)
    }
}

/// Errors detected by [`TaskGraph::compile`](crate::TaskGraph::compile).
///
/// A failed compile produces no compiled graph; the builder is left as it
/// was so it can be fixed and compiled again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The dependencies form a cycle; lists one cycle, first task repeated last.
    #[error("task graph contains a dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
    /// An edge names a task that does not belong to this graph.
    #[error("dependency refers to unknown task {0}")]
    UnknownTask(TaskId),
    /// A resource or index provider a task refers to cannot resolve.
    #[error("task '{task}' references missing resource '{resource}': {reason}")]
    MissingResource {
        task: String,
        resource: String,
        reason: String,
    },
    /// An indexed handle's slot count differs from its provider's range.
    #[error("'{resource}' binds {slots} slots but its index provider has range {range}")]
    SlotCountMismatch {
        resource: String,
        slots: usize,
        range: usize,
    },
    /// A binding is well formed but cannot work in this graph.
    #[error("task '{task}' has an invalid binding: {reason}")]
    InvalidBinding { task: String, reason: String },
}
