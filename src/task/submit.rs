use super::{resolve_all, resolve_optional, Binding, FrameContext};
use crate::backend::{Backend, Submission};
use crate::error::TaskError;
use crate::resource::ResourceHandle;

/// Submits command buffers to a queue.
///
/// Besides its explicit waits, the task waits on the semaphores of the
/// nearest upstream signalling tasks; those are filled in when the graph is
/// compiled. Every referenced resource is resolved before the backend is
/// called, so a failed resolution never produces a partial submission.
pub struct SubmitTask<B: Backend> {
    name: String,
    queue: ResourceHandle<B::Queue>,
    command_buffers: Vec<ResourceHandle<B::CommandBuffer>>,
    waits: Vec<ResourceHandle<B::Semaphore>>,
    derived_waits: Vec<ResourceHandle<B::Semaphore>>,
    signal: ResourceHandle<B::Semaphore>,
    fence: ResourceHandle<B::Fence>,
}

impl<B: Backend> SubmitTask<B> {
    /// Submit to `queue`; add command buffers before compiling.
    pub fn new(name: impl Into<String>, queue: impl Into<ResourceHandle<B::Queue>>) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            command_buffers: Vec::new(),
            waits: Vec::new(),
            derived_waits: Vec::new(),
            signal: ResourceHandle::Unbound,
            fence: ResourceHandle::Unbound,
        }
    }

    /// Add a command buffer to the submission.
    pub fn with_command_buffer(
        mut self,
        command_buffer: impl Into<ResourceHandle<B::CommandBuffer>>,
    ) -> Self {
        self.command_buffers.push(command_buffer.into());
        self
    }

    /// Wait on `semaphore` in addition to the waits derived from the graph.
    pub fn with_wait(mut self, semaphore: impl Into<ResourceHandle<B::Semaphore>>) -> Self {
        self.waits.push(semaphore.into());
        self
    }

    /// Semaphore signalled when the submitted work completes.
    pub fn with_signal(mut self, semaphore: impl Into<ResourceHandle<B::Semaphore>>) -> Self {
        self.signal = semaphore.into();
        self
    }

    /// Fence signalled when the submitted work completes.
    pub fn with_fence(mut self, fence: impl Into<ResourceHandle<B::Fence>>) -> Self {
        self.fence = fence.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of command buffers bound.
    pub fn command_buffer_count(&self) -> usize {
        self.command_buffers.len()
    }

    pub fn signal(&self) -> &ResourceHandle<B::Semaphore> {
        &self.signal
    }

    /// Waits added by graph compilation.
    pub fn derived_waits(&self) -> &[ResourceHandle<B::Semaphore>] {
        &self.derived_waits
    }

    pub(crate) fn waits_mut(
        &mut self,
    ) -> (
        &[ResourceHandle<B::Semaphore>],
        &mut Vec<ResourceHandle<B::Semaphore>>,
    ) {
        (&self.waits, &mut self.derived_waits)
    }

    pub(crate) fn bindings(&self) -> Vec<Binding> {
        let mut bindings = vec![Binding::of("queue", true, &self.queue)];
        bindings.extend(
            self.command_buffers
                .iter()
                .enumerate()
                .map(|(i, cb)| Binding::of(format!("command buffer {i}"), true, cb)),
        );
        bindings.extend(
            self.waits
                .iter()
                .enumerate()
                .map(|(i, s)| Binding::of(format!("wait semaphore {i}"), true, s)),
        );
        bindings.push(Binding::of("signal semaphore", false, &self.signal));
        bindings.push(Binding::of("fence", false, &self.fence));
        bindings
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        let queue = self.queue.get()?;
        let command_buffers = resolve_all(&self.command_buffers)?;
        let mut waits = resolve_all(&self.waits)?;
        waits.extend(resolve_all(&self.derived_waits)?);
        let signal = resolve_optional(&self.signal)?;
        let fence = resolve_optional(&self.fence)?;

        let command_buffers: Vec<&B::CommandBuffer> =
            command_buffers.iter().map(AsRef::as_ref).collect();
        let waits: Vec<&B::Semaphore> = waits.iter().map(AsRef::as_ref).collect();
        let signals: Vec<&B::Semaphore> = signal.iter().map(AsRef::as_ref).collect();

        ctx.device.submit(
            &queue,
            &Submission {
                command_buffers: &command_buffers,
                wait_semaphores: &waits,
                signal_semaphores: &signals,
                fence: fence.as_deref(),
            },
        )?;
        Ok(())
    }
}

impl<B: Backend> Clone for SubmitTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            queue: self.queue.clone(),
            command_buffers: self.command_buffers.clone(),
            waits: self.waits.clone(),
            derived_waits: self.derived_waits.clone(),
            signal: self.signal.clone(),
            fence: self.fence.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyBackend, DummyEvent};
    use crate::config::TaskGraphConfig;
    use crate::error::Unresolved;

    #[test]
    fn test_submit_passes_sync_objects() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue("graphics");
        let buffer = backend.create_command_buffer("main");
        let wait = backend.create_semaphore();
        let signal = backend.create_semaphore();
        let fence = backend.create_fence(false);

        let surface = backend.create_surface(1);
        backend
            .acquire_next_image(&surface, None, Some(&wait), None)
            .unwrap();
        backend.take_events();

        let task = SubmitTask::<DummyBackend>::new("submit", &queue)
            .with_command_buffer(&buffer)
            .with_wait(&wait)
            .with_signal(&signal)
            .with_fence(&fence);

        let config = TaskGraphConfig::default();
        task.execute(&FrameContext {
            device: &backend,
            config: &config,
            frame: 1,
        })
        .unwrap();

        assert_eq!(
            backend.take_events(),
            vec![DummyEvent::Submitted {
                queue: queue.id(),
                command_buffers: vec![buffer.id()],
                wait: vec![wait.id()],
                signal: vec![signal.id()],
                fence: Some(fence.id()),
            }]
        );
        assert!(signal.is_signaled());
        assert!(fence.is_signaled());
    }

    #[test]
    fn test_submit_unresolved_buffer_never_reaches_backend() {
        let backend = DummyBackend::new();
        let queue = backend.create_queue("graphics");
        let buffer = backend.create_command_buffer("main");
        let task = SubmitTask::<DummyBackend>::new("submit", &queue).with_command_buffer(&buffer);
        drop(buffer);

        let config = TaskGraphConfig::default();
        let result = task.execute(&FrameContext {
            device: &backend,
            config: &config,
            frame: 1,
        });
        assert_eq!(
            result,
            Err(TaskError::ResourceUnresolved(Unresolved::Dropped))
        );
        assert!(backend.events().is_empty());
    }
}
