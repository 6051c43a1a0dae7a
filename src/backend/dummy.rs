//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't perform actual GPU operations but provides a valid
//! [`Backend`] implementation so task graphs can be built, compiled and
//! driven without GPU hardware. Every call is recorded as a [`DummyEvent`].
//!
//! Semaphores behave like binary GPU semaphores: acquire and submit signal
//! them, submit and present waits consume them. Waiting on one that was
//! never signalled, or signalling one that nobody has waited on yet, is
//! reported as an error. Fences are signalled as soon as
//! the submission that carries them is "executed", which happens immediately.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{Backend, BackendError, Submission};

/// A call observed by the dummy backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DummyEvent {
    Acquired {
        surface: u64,
        image_index: u32,
        signal: Option<u64>,
        timeout: Option<Duration>,
    },
    Submitted {
        queue: u64,
        command_buffers: Vec<u64>,
        wait: Vec<u64>,
        signal: Vec<u64>,
        fence: Option<u64>,
    },
    Presented {
        queue: u64,
        surface: u64,
        image_index: u32,
        wait: Vec<u64>,
    },
    FencesWaited(Vec<u64>),
    FencesReset(Vec<u64>),
}

/// Dummy presentation surface with a fixed number of images.
///
/// Images are handed out round-robin unless an outcome has been scripted
/// with [`script_acquire`](Self::script_acquire).
#[derive(Debug)]
pub struct DummySurface {
    id: u64,
    image_count: u32,
    next_image: AtomicU32,
    generation: AtomicU64,
    acquire_script: Mutex<VecDeque<Result<u32, BackendError>>>,
    present_script: Mutex<VecDeque<BackendError>>,
}

impl DummySurface {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    /// Number of times the surface has been recreated.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Queue the outcome of a future acquire, overriding round-robin order.
    pub fn script_acquire(&self, outcome: Result<u32, BackendError>) {
        self.acquire_script.lock().push_back(outcome);
    }

    /// Make a future present fail with `error`.
    pub fn script_present_failure(&self, error: BackendError) {
        self.present_script.lock().push_back(error);
    }

    /// Simulate swapchain recreation: image order restarts from 0.
    pub fn recreate(&self) {
        self.next_image.store(0, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        log::trace!("DummySurface {}: recreated", self.id);
    }

    fn next_acquire(&self) -> Result<u32, BackendError> {
        if let Some(outcome) = self.acquire_script.lock().pop_front() {
            return outcome;
        }
        let image = self.next_image.fetch_add(1, Ordering::AcqRel) % self.image_count;
        Ok(image)
    }
}

/// Dummy command queue.
#[derive(Debug)]
pub struct DummyQueue {
    id: u64,
    label: String,
}

impl DummyQueue {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Dummy command buffer that records commands as strings.
#[derive(Debug)]
pub struct DummyCommandBuffer {
    id: u64,
    label: String,
    commands: Mutex<Vec<String>>,
    submit_count: AtomicU64,
}

impl DummyCommandBuffer {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record a command.
    pub fn record(&self, command: impl Into<String>) {
        self.commands.lock().push(command.into());
    }

    /// Commands recorded since the last reset.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn reset(&self) {
        self.commands.lock().clear();
    }

    /// How many times this buffer was part of a submission.
    pub fn submit_count(&self) -> u64 {
        self.submit_count.load(Ordering::Acquire)
    }
}

/// Dummy binary semaphore.
#[derive(Debug)]
pub struct DummySemaphore {
    id: u64,
    signaled: AtomicBool,
}

impl DummySemaphore {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    /// Drop a pending signal, as recreating the semaphore would.
    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    fn ensure_unsignaled(&self) -> Result<(), BackendError> {
        if self.is_signaled() {
            Err(BackendError::Other(format!(
                "semaphore {} signalled again before being waited on",
                self.id
            )))
        } else {
            Ok(())
        }
    }

    fn signal(&self) -> Result<(), BackendError> {
        self.ensure_unsignaled()?;
        self.signaled.store(true, Ordering::Release);
        Ok(())
    }

    fn consume(&self) -> Result<(), BackendError> {
        if self.signaled.swap(false, Ordering::AcqRel) {
            Ok(())
        } else {
            Err(BackendError::Other(format!(
                "semaphore {} waited on before being signalled",
                self.id
            )))
        }
    }
}

/// Dummy CPU-GPU fence.
///
/// Clones share state, so a fence can be signalled from another thread.
#[derive(Debug, Clone)]
pub struct DummyFence {
    id: u64,
    signaled: Arc<AtomicBool>,
}

impl DummyFence {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }

    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.signaled.store(false, Ordering::Release);
    }

    fn wait(&self, deadline: Option<Instant>) -> bool {
        while !self.is_signaled() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }
}

/// Dummy GPU backend.
#[derive(Debug)]
pub struct DummyBackend {
    next_id: AtomicU64,
    events: Mutex<Vec<DummyEvent>>,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            events: Mutex::new(Vec::new()),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a surface with `image_count` presentable images.
    ///
    /// # Panics
    ///
    /// Panics if `image_count` is 0.
    pub fn create_surface(&self, image_count: u32) -> Arc<DummySurface> {
        assert!(image_count > 0, "surface needs at least one image");
        let id = self.next_id();
        log::trace!("DummyBackend: creating surface {id} with {image_count} images");
        Arc::new(DummySurface {
            id,
            image_count,
            next_image: AtomicU32::new(0),
            generation: AtomicU64::new(0),
            acquire_script: Mutex::new(VecDeque::new()),
            present_script: Mutex::new(VecDeque::new()),
        })
    }

    pub fn create_queue(&self, label: impl Into<String>) -> Arc<DummyQueue> {
        Arc::new(DummyQueue {
            id: self.next_id(),
            label: label.into(),
        })
    }

    pub fn create_command_buffer(&self, label: impl Into<String>) -> Arc<DummyCommandBuffer> {
        Arc::new(DummyCommandBuffer {
            id: self.next_id(),
            label: label.into(),
            commands: Mutex::new(Vec::new()),
            submit_count: AtomicU64::new(0),
        })
    }

    /// Create `count` command buffers labelled `{label}[i]`.
    pub fn create_command_buffers(
        &self,
        label: &str,
        count: usize,
    ) -> Vec<Arc<DummyCommandBuffer>> {
        (0..count)
            .map(|i| self.create_command_buffer(format!("{label}[{i}]")))
            .collect()
    }

    pub fn create_semaphore(&self) -> Arc<DummySemaphore> {
        Arc::new(DummySemaphore {
            id: self.next_id(),
            signaled: AtomicBool::new(false),
        })
    }

    pub fn create_semaphores(&self, count: usize) -> Vec<Arc<DummySemaphore>> {
        (0..count).map(|_| self.create_semaphore()).collect()
    }

    pub fn create_fence(&self, signaled: bool) -> Arc<DummyFence> {
        Arc::new(DummyFence {
            id: self.next_id(),
            signaled: Arc::new(AtomicBool::new(signaled)),
        })
    }

    pub fn create_fences(&self, count: usize, signaled: bool) -> Vec<Arc<DummyFence>> {
        (0..count).map(|_| self.create_fence(signaled)).collect()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<DummyEvent> {
        self.events.lock().clone()
    }

    /// Drain the recorded events.
    pub fn take_events(&self) -> Vec<DummyEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn record(&self, event: DummyEvent) {
        self.events.lock().push(event);
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DummyBackend {
    type CommandBuffer = DummyCommandBuffer;
    type Semaphore = DummySemaphore;
    type Fence = DummyFence;
    type Queue = DummyQueue;
    type Surface = DummySurface;

    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn acquire_next_image(
        &self,
        surface: &DummySurface,
        timeout: Option<Duration>,
        signal: Option<&DummySemaphore>,
        fence: Option<&DummyFence>,
    ) -> Result<u32, BackendError> {
        log::trace!(
            "DummyBackend: acquire on surface {} (timeout {:?})",
            surface.id,
            timeout
        );
        if let Some(semaphore) = signal {
            semaphore.ensure_unsignaled()?;
        }
        let image_index = surface.next_acquire()?;
        if image_index >= surface.image_count {
            return Err(BackendError::Other(format!(
                "scripted image {image_index} exceeds surface image count {}",
                surface.image_count
            )));
        }
        if let Some(semaphore) = signal {
            semaphore.signal()?;
        }
        if let Some(fence) = fence {
            fence.signal();
        }
        self.record(DummyEvent::Acquired {
            surface: surface.id,
            image_index,
            signal: signal.map(DummySemaphore::id),
            timeout,
        });
        Ok(image_index)
    }

    fn submit(
        &self,
        queue: &DummyQueue,
        submission: &Submission<'_, Self>,
    ) -> Result<(), BackendError> {
        log::trace!(
            "DummyBackend: submit {} command buffers to queue '{}'",
            submission.command_buffers.len(),
            queue.label
        );
        for semaphore in submission.wait_semaphores {
            semaphore.consume()?;
        }
        for semaphore in submission.signal_semaphores {
            semaphore.ensure_unsignaled()?;
        }
        for buffer in submission.command_buffers {
            buffer.submit_count.fetch_add(1, Ordering::AcqRel);
        }
        // No real GPU work: the submission completes immediately.
        for semaphore in submission.signal_semaphores {
            semaphore.signal()?;
        }
        if let Some(fence) = submission.fence {
            fence.signal();
        }
        self.record(DummyEvent::Submitted {
            queue: queue.id,
            command_buffers: submission.command_buffers.iter().map(|b| b.id).collect(),
            wait: submission.wait_semaphores.iter().map(|s| s.id).collect(),
            signal: submission.signal_semaphores.iter().map(|s| s.id).collect(),
            fence: submission.fence.map(DummyFence::id),
        });
        Ok(())
    }

    fn present(
        &self,
        queue: &DummyQueue,
        surface: &DummySurface,
        image_index: u32,
        wait: &[&DummySemaphore],
    ) -> Result<(), BackendError> {
        log::trace!(
            "DummyBackend: present image {} of surface {}",
            image_index,
            surface.id
        );
        for semaphore in wait {
            semaphore.consume()?;
        }
        if let Some(error) = surface.present_script.lock().pop_front() {
            return Err(error);
        }
        self.record(DummyEvent::Presented {
            queue: queue.id,
            surface: surface.id,
            image_index,
            wait: wait.iter().map(|s| s.id).collect(),
        });
        Ok(())
    }

    fn wait_for_fences(
        &self,
        fences: &[&DummyFence],
        timeout: Option<Duration>,
    ) -> Result<(), BackendError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        for fence in fences {
            if !fence.wait(deadline) {
                return Err(BackendError::Timeout);
            }
        }
        self.record(DummyEvent::FencesWaited(
            fences.iter().map(|f| f.id).collect(),
        ));
        Ok(())
    }

    fn reset_fences(&self, fences: &[&DummyFence]) -> Result<(), BackendError> {
        for fence in fences {
            fence.reset();
        }
        self.record(DummyEvent::FencesReset(fences.iter().map(|f| f.id).collect()));
        Ok(())
    }
}
