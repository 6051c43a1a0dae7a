use std::fmt;
use std::sync::Arc;

use super::{Binding, FrameContext};
use crate::backend::Backend;
use crate::config::TaskGraphConfig;
use crate::error::TaskError;
use crate::provider::IndexProvider;
use crate::resource::ResourceHandle;

type RenderFn<B> = dyn Fn(&RenderContext<'_, B>) -> Result<(), TaskError> + Send + Sync;
type CustomFn<B> = dyn Fn(&FrameContext<'_, B>) -> Result<(), TaskError> + Send + Sync;

/// What a render callback sees.
pub struct RenderContext<'a, B: Backend> {
    pub device: &'a B,
    pub config: &'a TaskGraphConfig,
    /// Command buffer resolved for the current slot.
    pub command_buffer: &'a B::CommandBuffer,
    /// Current slot, when the task was given an index provider.
    pub slot: Option<u32>,
    pub frame: u64,
}

/// Runs a recording callback against the command buffer of the current slot.
///
/// The task itself does no GPU work. It only guarantees the command buffer
/// resolves before the callback runs.
pub struct RenderTask<B: Backend> {
    name: String,
    command_buffer: ResourceHandle<B::CommandBuffer>,
    index: Option<IndexProvider>,
    callback: Arc<RenderFn<B>>,
}

impl<B: Backend> RenderTask<B> {
    /// Record into `command_buffer` with `callback` every cycle.
    pub fn new<F>(
        name: impl Into<String>,
        command_buffer: impl Into<ResourceHandle<B::CommandBuffer>>,
        callback: F,
    ) -> Self
    where
        F: Fn(&RenderContext<'_, B>) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            command_buffer: command_buffer.into(),
            index: None,
            callback: Arc::new(callback),
        }
    }

    /// Pass the provider's current index to the callback as `slot`.
    pub fn with_index(mut self, index: &IndexProvider) -> Self {
        self.index = Some(index.clone());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<&IndexProvider> {
        self.index.as_ref()
    }

    pub(crate) fn bindings(&self) -> Vec<Binding> {
        vec![Binding::of("command buffer", true, &self.command_buffer)]
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        let command_buffer = self.command_buffer.get()?;
        let slot = self.index.as_ref().map(IndexProvider::value).transpose()?;
        (self.callback)(&RenderContext {
            device: ctx.device,
            config: ctx.config,
            command_buffer: &command_buffer,
            slot,
            frame: ctx.frame,
        })
    }
}

impl<B: Backend> Clone for RenderTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            command_buffer: self.command_buffer.clone(),
            index: self.index.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}

impl<B: Backend> fmt::Debug for RenderTask<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTask")
            .field("name", &self.name)
            .field("command_buffer", &self.command_buffer)
            .finish_non_exhaustive()
    }
}

/// Runs CPU-side per-frame work with no resource precondition.
pub struct CustomTask<B: Backend> {
    name: String,
    callback: Arc<CustomFn<B>>,
}

impl<B: Backend> CustomTask<B> {
    /// Run `callback` every cycle.
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&FrameContext<'_, B>) -> Result<(), TaskError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        (self.callback)(ctx)
    }
}

impl<B: Backend> Clone for CustomTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callback: Arc::clone(&self.callback),
        }
    }
}
