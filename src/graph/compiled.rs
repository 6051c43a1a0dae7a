use std::fmt;
use std::sync::Arc;

use super::TaskId;
use crate::backend::Backend;
use crate::config::TaskGraphConfig;
use crate::error::TaskError;
use crate::task::{FrameContext, Task};

/// A validated, topologically ordered task list.
///
/// The topology never changes after compilation; only the state behind the
/// tasks' handles and providers does. Call [`execute`](Self::execute) once
/// per frame.
pub struct CompiledGraph<B: Backend> {
    device: Arc<B>,
    config: TaskGraphConfig,
    /// Tasks in execution order.
    tasks: Vec<Task<B>>,
    /// Builder ids of `tasks`, in the same order.
    order: Vec<TaskId>,
    frame: u64,
}

impl<B: Backend> CompiledGraph<B> {
    pub(super) fn new(
        device: Arc<B>,
        config: TaskGraphConfig,
        tasks: Vec<Task<B>>,
        order: Vec<TaskId>,
    ) -> Self {
        Self {
            device,
            config,
            tasks,
            order,
            frame: 0,
        }
    }

    /// Run every task once, in compiled order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing task and returns its error unchanged; the
    /// remaining tasks do not run for this cycle.
    pub fn execute(&mut self) -> Result<(), TaskError> {
        self.frame += 1;
        let ctx = FrameContext {
            device: &*self.device,
            config: &self.config,
            frame: self.frame,
        };

        for task in &self.tasks {
            log::trace!(
                "{} frame {}: {} '{}'",
                self.config.label,
                self.frame,
                task.kind(),
                task.name()
            );
            task.execute(&ctx)?;
        }
        Ok(())
    }

    /// Builder ids in execution order.
    pub fn order(&self) -> &[TaskId] {
        &self.order
    }

    /// Task names in execution order.
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(Task::name).collect()
    }

    /// Tasks in execution order.
    pub fn tasks(&self) -> &[Task<B>] {
        &self.tasks
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True for a graph without tasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of times [`execute`](Self::execute) has been called.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Backend the tasks run against.
    pub fn device(&self) -> &Arc<B> {
        &self.device
    }

    /// Configuration copied from the builder.
    pub fn config(&self) -> &TaskGraphConfig {
        &self.config
    }
}

impl<B: Backend> fmt::Debug for CompiledGraph<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledGraph")
            .field("label", &self.config.label)
            .field("order", &self.task_names())
            .field("frame", &self.frame)
            .finish()
    }
}
