use bitflags::bitflags;

use super::{resolve_all, Binding, FrameContext};
use crate::backend::Backend;
use crate::error::TaskError;
use crate::resource::ResourceHandle;

bitflags! {
    /// What a [`FenceTask`] does with its fences.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FenceAction: u8 {
        /// Block until every fence is signalled.
        const WAIT = 1 << 0;
        /// Return every fence to the unsignalled state (after waiting, if both).
        const RESET = 1 << 1;
    }
}

/// Waits on and/or resets fences.
///
/// Placed before the tasks that reuse a frame slot, this makes sure the
/// slot's previous GPU work has finished. Waits use
/// [`TaskGraphConfig::fence_timeout`](crate::TaskGraphConfig::fence_timeout).
pub struct FenceTask<B: Backend> {
    name: String,
    fences: Vec<ResourceHandle<B::Fence>>,
    action: FenceAction,
}

impl<B: Backend> FenceTask<B> {
    /// Apply `action` to the fences added with `with_fence`.
    pub fn new(name: impl Into<String>, action: FenceAction) -> Self {
        Self {
            name: name.into(),
            fences: Vec::new(),
            action,
        }
    }

    /// Add a fence to wait on or reset.
    pub fn with_fence(mut self, fence: impl Into<ResourceHandle<B::Fence>>) -> Self {
        self.fences.push(fence.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> FenceAction {
        self.action
    }

    pub(crate) fn bindings(&self) -> Vec<Binding> {
        self.fences
            .iter()
            .enumerate()
            .map(|(i, fence)| Binding::of(format!("fence {i}"), true, fence))
            .collect()
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        let fences = resolve_all(&self.fences)?;
        let fences: Vec<&B::Fence> = fences.iter().map(AsRef::as_ref).collect();

        if self.action.contains(FenceAction::WAIT) {
            ctx.device
                .wait_for_fences(&fences, ctx.config.fence_timeout)
                .map_err(|err| err.into_task_error("fence"))?;
        }
        if self.action.contains(FenceAction::RESET) {
            ctx.device.reset_fences(&fences)?;
        }
        Ok(())
    }
}

impl<B: Backend> Clone for FenceTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            fences: self.fences.clone(),
            action: self.action,
        }
    }
}
