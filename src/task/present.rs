use super::{resolve_all, Binding, FrameContext};
use crate::backend::Backend;
use crate::error::TaskError;
use crate::provider::IndexProvider;
use crate::resource::ResourceHandle;

/// Presents the image selected by the task's [`IndexProvider`].
///
/// Waits on its explicit semaphores plus those derived from the graph
/// (normally the semaphore signalled by the upstream submit).
pub struct PresentTask<B: Backend> {
    name: String,
    queue: ResourceHandle<B::Queue>,
    surface: ResourceHandle<B::Surface>,
    index: IndexProvider,
    waits: Vec<ResourceHandle<B::Semaphore>>,
    derived_waits: Vec<ResourceHandle<B::Semaphore>>,
}

impl<B: Backend> PresentTask<B> {
    /// Present the image selected by `index` on `surface`.
    pub fn new(
        name: impl Into<String>,
        queue: impl Into<ResourceHandle<B::Queue>>,
        surface: impl Into<ResourceHandle<B::Surface>>,
        index: &IndexProvider,
    ) -> Self {
        Self {
            name: name.into(),
            queue: queue.into(),
            surface: surface.into(),
            index: index.clone(),
            waits: Vec::new(),
            derived_waits: Vec::new(),
        }
    }

    /// Wait on `semaphore` in addition to the derived waits.
    pub fn with_wait(mut self, semaphore: impl Into<ResourceHandle<B::Semaphore>>) -> Self {
        self.waits.push(semaphore.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &IndexProvider {
        &self.index
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
        let mut bindings = vec![
            Binding::of("queue", true, &self.queue),
            Binding::of("surface", true, &self.surface),
        ];
        bindings.extend(
            self.waits
                .iter()
                .enumerate()
                .map(|(i, s)| Binding::of(format!("wait semaphore {i}"), true, s)),
        );
        bindings
    }

    pub(crate) fn execute(&self, ctx: &FrameContext<'_, B>) -> Result<(), TaskError> {
        let queue = self.queue.get()?;
        let surface = self.surface.get()?;
        let image_index = self.index.value()?;
        let mut waits = resolve_all(&self.waits)?;
        waits.extend(resolve_all(&self.derived_waits)?);
        let waits: Vec<&B::Semaphore> = waits.iter().map(AsRef::as_ref).collect();

        ctx.device
            .present(&queue, &surface, image_index, &waits)
            .map_err(|err| err.into_task_error("presentation"))
    }
}

impl<B: Backend> Clone for PresentTask<B> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            queue: self.queue.clone(),
            surface: self.surface.clone(),
            index: self.index.clone(),
            waits: self.waits.clone(),
            derived_waits: self.derived_waits.clone(),
        }
    }
}
