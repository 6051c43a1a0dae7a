//! Shared fixtures for the frame pipeline integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use framegraph::backend::dummy::{
    DummyBackend, DummyCommandBuffer, DummyEvent, DummyQueue, DummySemaphore, DummySurface,
};
use framegraph::{
    AcquireTask, CompiledGraph, GraphError, IndexProvider, PresentTask, RenderTask,
    ResourceHandle, SubmitTask, TaskError, TaskGraph, TaskId,
};

/// Install a test logger once; output shows with `--nocapture`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Decides whether the render callback of a given cycle fails.
pub type RenderFailure = Arc<Mutex<Option<(u64, TaskError)>>>;

/// The four-task pipeline `acquire -> render -> submit -> present`.
///
/// The surface has one image per slot and the acquired image index selects
/// the command buffer, so the index provider is the frame slot.
pub struct TestPipeline {
    pub backend: Arc<DummyBackend>,
    pub surface: Arc<DummySurface>,
    pub queue: Arc<DummyQueue>,
    pub command_buffers: Vec<Arc<DummyCommandBuffer>>,
    pub image_ready: Arc<DummySemaphore>,
    pub render_done: Arc<DummySemaphore>,
    pub slot: IndexProvider,
    /// Slot seen by every render callback, in call order.
    pub rendered_slots: Arc<Mutex<Vec<u32>>>,
    pub render_failure: RenderFailure,
    pub graph: TaskGraph<DummyBackend>,
    pub ids: [TaskId; 4],
}

impl TestPipeline {
    pub fn new(slots: usize) -> Self {
        init_logging();

        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(slots as u32);
        let queue = backend.create_queue("graphics");
        let command_buffers = backend.create_command_buffers("frame", slots);
        let image_ready = backend.create_semaphore();
        let render_done = backend.create_semaphore();

        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let slot = graph.add_index_provider(slots);
        let command_buffer = ResourceHandle::indexed(&command_buffers, &slot);

        let rendered_slots = Arc::new(Mutex::new(Vec::new()));
        let render_failure: RenderFailure = Arc::new(Mutex::new(None));

        let acquire = graph.add_task(
            AcquireTask::<DummyBackend>::new("acquire", &surface, &slot).with_signal(&image_ready),
        );
        let render = {
            let rendered_slots = Arc::clone(&rendered_slots);
            let render_failure = Arc::clone(&render_failure);
            graph.add_task(
                RenderTask::<DummyBackend>::new("render", command_buffer.clone(), move |ctx| {
                    if let Some((frame, err)) = render_failure.lock().as_ref() {
                        if *frame == ctx.frame {
                            return Err(err.clone());
                        }
                    }
                    if let Some(slot) = ctx.slot {
                        rendered_slots.lock().push(slot);
                    }
                    ctx.command_buffer.record(format!("frame {}", ctx.frame));
                    Ok(())
                })
                .with_index(&slot),
            )
        };
        let submit = graph.add_task(
            SubmitTask::<DummyBackend>::new("submit", &queue)
                .with_command_buffer(command_buffer)
                .with_signal(&render_done),
        );
        let present = graph.add_task(PresentTask::<DummyBackend>::new(
            "present", &queue, &surface, &slot,
        ));

        graph.add_dependency(acquire, render);
        graph.add_dependency(render, submit);
        graph.add_dependency(submit, present);

        Self {
            backend,
            surface,
            queue,
            command_buffers,
            image_ready,
            render_done,
            slot,
            rendered_slots,
            render_failure,
            graph,
            ids: [acquire, render, submit, present],
        }
    }

    pub fn compile(&self) -> Result<CompiledGraph<DummyBackend>, GraphError> {
        self.graph.compile()
    }

    pub fn rendered_slots(&self) -> Vec<u32> {
        self.rendered_slots.lock().clone()
    }

    pub fn fail_render_at(&self, frame: u64, err: TaskError) {
        *self.render_failure.lock() = Some((frame, err));
    }

    /// Image indices of all presents, in order.
    pub fn presented_images(&self) -> Vec<u32> {
        self.backend
            .events()
            .into_iter()
            .filter_map(|event| match event {
                DummyEvent::Presented { image_index, .. } => Some(image_index),
                _ => None,
            })
            .collect()
    }

    pub fn submit_count(&self) -> usize {
        self.backend
            .events()
            .iter()
            .filter(|event| matches!(event, DummyEvent::Submitted { .. }))
            .count()
    }
}
