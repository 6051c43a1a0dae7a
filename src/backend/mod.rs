//! Backend abstraction layer.
//!
//! The task graph never talks to a graphics API directly. Surface image
//! acquisition, queue submission, presentation and fence waits are delegated
//! to a [`Backend`] implementation, and the objects those calls operate on
//! (command buffers, semaphores, fences, queues, surfaces) are owned outside
//! the graph and reached through [`ResourceHandle`](crate::ResourceHandle)s.
//!
//! # Available Backends
//!
//! - [`dummy::DummyBackend`]: CPU-only backend for tests and development

pub mod dummy;

use std::time::Duration;

use thiserror::Error;

use crate::error::TaskError;

/// Errors reported by backend operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The surface no longer matches the presentation target (e.g. resized).
    #[error("surface out of date")]
    OutOfDate,
    /// A bounded wait expired.
    #[error("operation timed out")]
    Timeout,
    /// The device was lost.
    #[error("device lost")]
    DeviceLost,
    /// Any other backend failure.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Convert into a [`TaskError`], naming what a timeout was waiting for.
    pub fn into_task_error(self, waited_on: &'static str) -> TaskError {
        match self {
            Self::OutOfDate => TaskError::SurfaceOutOfDate,
            Self::Timeout => TaskError::Timeout(waited_on),
            Self::DeviceLost => TaskError::DeviceLost,
            Self::Other(msg) => TaskError::Backend(msg),
        }
    }
}

impl From<BackendError> for TaskError {
    fn from(err: BackendError) -> Self {
        err.into_task_error("device operation")
    }
}

/// One queue submission.
pub struct Submission<'a, B: Backend + ?Sized> {
    pub command_buffers: &'a [&'a B::CommandBuffer],
    pub wait_semaphores: &'a [&'a B::Semaphore],
    pub signal_semaphores: &'a [&'a B::Semaphore],
    pub fence: Option<&'a B::Fence>,
}

/// Graphics backend consumed by the pipeline tasks.
pub trait Backend: Send + Sync + 'static {
    type CommandBuffer: Send + Sync + 'static;
    type Semaphore: Send + Sync + 'static;
    type Fence: Send + Sync + 'static;
    type Queue: Send + Sync + 'static;
    type Surface: Send + Sync + 'static;

    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Acquire the next presentable image of `surface`, returning its index.
    ///
    /// `signal` and `fence` are signalled once the image is ready for use.
    fn acquire_next_image(
        &self,
        surface: &Self::Surface,
        timeout: Option<Duration>,
        signal: Option<&Self::Semaphore>,
        fence: Option<&Self::Fence>,
    ) -> Result<u32, BackendError>;

    /// Enqueue a submission. Returns as soon as the work is queued.
    fn submit(&self, queue: &Self::Queue, submission: &Submission<'_, Self>)
        -> Result<(), BackendError>;

    /// Queue presentation of `image_index` once all `wait` semaphores are signalled.
    fn present(
        &self,
        queue: &Self::Queue,
        surface: &Self::Surface,
        image_index: u32,
        wait: &[&Self::Semaphore],
    ) -> Result<(), BackendError>;

    /// Block until every fence is signalled.
    fn wait_for_fences(
        &self,
        fences: &[&Self::Fence],
        timeout: Option<Duration>,
    ) -> Result<(), BackendError>;

    /// Return fences to the unsignalled state.
    fn reset_fences(&self, fences: &[&Self::Fence]) -> Result<(), BackendError>;
}
