//! # framegraph
//!
//! A compiled per-frame task graph for the acquire / render / submit /
//! present loop of a renderer.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`ResourceHandle`] - Non-owning handle to an externally owned GPU object,
//!   fixed or selected per frame slot
//! - [`IndexProvider`] / [`ResourceProvider`] - Shared "current slot" state
//! - [`Task`] - Acquire, render, custom, submit, present and fence steps
//! - [`TaskGraph`] - Builder with explicit ordering edges
//! - [`CompiledGraph`] - Frozen task order, executed once per frame
//! - [`Backend`] - Trait the tasks use to reach the graphics API, with a
//!   [`DummyBackend`](backend::dummy::DummyBackend) for tests
//!
//! The graph is built and compiled once. Every frame only the slot index
//! behind the providers changes; tasks, handles and ordering stay as they
//! were compiled.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use framegraph::backend::dummy::DummyBackend;
//! use framegraph::{AcquireTask, PresentTask, RenderTask, ResourceHandle, SubmitTask, TaskGraph};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let surface = backend.create_surface(2);
//! let queue = backend.create_queue("graphics");
//! let buffers = backend.create_command_buffers("frame", 2);
//! let image_ready = backend.create_semaphore();
//! let render_done = backend.create_semaphore();
//!
//! let mut graph = TaskGraph::new(Arc::clone(&backend));
//! let image = graph.add_index_provider(2);
//! let command_buffer = ResourceHandle::indexed(&buffers, &image);
//!
//! let acquire = graph.add_task(
//!     AcquireTask::<DummyBackend>::new("acquire", &surface, &image).with_signal(&image_ready),
//! );
//! let render = graph.add_task(RenderTask::<DummyBackend>::new(
//!     "render",
//!     command_buffer.clone(),
//!     |ctx| {
//!         ctx.command_buffer.record("draw");
//!         Ok(())
//!     },
//! ));
//! let submit = graph.add_task(
//!     SubmitTask::<DummyBackend>::new("submit", &queue)
//!         .with_command_buffer(command_buffer)
//!         .with_signal(&render_done),
//! );
//! let present = graph.add_task(PresentTask::<DummyBackend>::new("present", &queue, &surface, &image));
//! graph.add_dependency(acquire, render);
//! graph.add_dependency(render, submit);
//! graph.add_dependency(submit, present);
//!
//! let mut compiled = graph.compile()?;
//! for _ in 0..3 {
//!     compiled.execute()?;
//! }
//! assert_eq!(image.get(), Some(0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod provider;
pub mod resource;
pub mod task;

// Re-export main types for convenience
pub use backend::{Backend, BackendError, Submission};
pub use config::TaskGraphConfig;
pub use error::{GraphError, TaskError, Unresolved};
pub use graph::{CompiledGraph, TaskGraph, TaskId};
pub use provider::{CommandBufferProvider, IndexProvider, ProviderId, ResourceProvider};
pub use resource::{BindingState, ResourceHandle, ResourceRef, SlotIndex};
pub use task::{
    AcquireTask, Binding, Capabilities, CustomTask, FenceAction, FenceTask, FrameContext,
    PresentTask, RenderContext, RenderTask, SubmitTask, Task, TaskKind,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
