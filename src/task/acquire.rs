use std::sync::Arc;
use std::time::Duration;

use super::{resolve_optional, Binding, FrameContext};
use crate::backend::Backend;
use crate::error::TaskError;
use crate::provider::IndexProvider;
use crate::resource::ResourceHandle;

/// Acquires the next presentable image and publishes its index.
///
/// On success the image index is written into the task's [`IndexProvider`],
/// which selects the slot for every handle indexed by it during the rest of
/// the cycle. On failure the index is left untouched.
///
/// # Errors
///
/// - [`TaskError::SurfaceOutOfDate`] when the surface must be rebuilt.
/// - [`TaskError::Timeout`] when the acquire timeout expired.
/// - [`TaskError::DeviceLost`] on device loss.
pub struct AcquireTask<B: Backend> {
    name: String,
    surface: ResourceHandle<B::Surface>,
    index: IndexProvider,
    signal: ResourceHandle<B::Semaphore>,
    fence: ResourceHandle<B::Fence>,
    timeout: Option<Duration>,
}

impl<B: Backend> AcquireTask<B> {
    /// Acquire from `surface` and write the image index into `index`.
    pub fn new(
        name: impl Into<String>,
        surface: impl Into<ResourceHandle<B::Surface>>,
        index: &IndexProvider,
    ) -> Self {
        Self {
            name: name.into(),
            surface: surface.into(),
            index: index.clone(),
            signal: ResourceHandle::Unbound,
            fence: ResourceHandle::Unbound,
            timeout: None,
        }
    }

    /// Semaphore signalled once the image is ready.
    ///
    /// It must not be indexed by the provider this task writes, since the
    /// semaphore is needed before the image index is known.
    pub fn with_signal(mut self, semaphore: impl Into<ResourceHandle<B::Semaphore>>) -> Self {
        self.signal = semaphore.into();
        self
    }

    /// Fence signalled once the image is ready.
    pub fn with_fence(mut self, fence: impl Into<ResourceHandle<B::Fence>>) -> Self {
        self.fence = fence.into();
        self
    }

    /// Overrides [`TaskGraphConfig::acquire_timeout`](crate::TaskGraphConfig::acquire_timeout).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider this task writes.
    pub fn index(&self) -> &IndexProvider {
        &self.index
    }

    pub fn signal(&self) -> &ResourceHandle<B::Semaphore> {
        &self.signal
    }

    pub(crate) fn bindings(&self) -> Vec<Binding> {
        vec![
            Binding::of("surface", true, &self.surface),
            Binding::of("signal semaphore", false, &self.signal),
            Binding::of("fence", false, &self.fence),
        ]
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        let surface: Arc<B::Surface> = self.surface.get()?;
        let signal = resolve_optional(&self.signal)?;
        let fence = resolve_optional(&self.fence)?;
        let timeout = self.timeout.or(ctx.config.acquire_timeout);

        let image_index = ctx
            .device
            .acquire_next_image(&surface, timeout, signal.as_deref(), fence.as_deref())
            .map_err(|err| err.into_task_error("surface image"))?;
        self.index.set(image_index)
    }
}

impl<B: Backend> Clone for AcquireTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            surface: self.surface.clone(),
            index: self.index.clone(),
            signal: self.signal.clone(),
            fence: self.fence.clone(),
            timeout: self.timeout,
        }
    }
}
