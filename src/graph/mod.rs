//! Task graph construction.
//!
//! A [`TaskGraph`] is built once during setup: tasks are added, ordering
//! edges between them are declared, and the index providers the tasks share
//! are registered. [`TaskGraph::compile`] then validates everything and
//! freezes it into a [`CompiledGraph`] that is executed once per frame.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use framegraph::backend::dummy::DummyBackend;
//! use framegraph::{AcquireTask, PresentTask, TaskGraph};
//!
//! let backend = Arc::new(DummyBackend::new());
//! let surface = backend.create_surface(2);
//! let queue = backend.create_queue("graphics");
//!
//! let mut graph = TaskGraph::new(Arc::clone(&backend));
//! let image = graph.add_index_provider(2);
//! let acquire = graph.add_task(AcquireTask::<DummyBackend>::new("acquire", &surface, &image));
//! let present = graph.add_task(PresentTask::<DummyBackend>::new("present", &queue, &surface, &image));
//! graph.add_dependency(acquire, present);
//!
//! let mut compiled = graph.compile().unwrap();
//! compiled.execute().unwrap();
//! assert_eq!(image.get(), Some(0));
//! ```

mod compiled;
mod compiler;

pub use compiled::CompiledGraph;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::backend::Backend;
use crate::config::TaskGraphConfig;
use crate::error::GraphError;
use crate::provider::{IndexProvider, ProviderId};
use crate::resource::SlotIndex;
use crate::task::Task;

/// Handle to a task in a [`TaskGraph`].
///
/// Only meaningful for the graph that returned it. Ids are insertion
/// indices, which also break ordering ties during compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u32);

impl TaskId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the task in insertion order.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Mutable graph of tasks and explicit ordering edges.
pub struct TaskGraph<B: Backend> {
    device: Arc<B>,
    config: TaskGraphConfig,
    tasks: Vec<Task<B>>,
    /// Edges stored as (before, after) pairs.
    edges: Vec<(TaskId, TaskId)>,
    providers: HashSet<ProviderId>,
}

impl<B: Backend> TaskGraph<B> {
    /// Create an empty graph with the default configuration.
    pub fn new(device: Arc<B>) -> Self {
        Self::with_config(device, TaskGraphConfig::default())
    }

    /// Create an empty graph with `config`.
    pub fn with_config(device: Arc<B>, config: TaskGraphConfig) -> Self {
        Self {
            device,
            config,
            tasks: Vec::new(),
            edges: Vec::new(),
            providers: HashSet::new(),
        }
    }

    /// Add a task and return its id.
    pub fn add_task(&mut self, task: impl Into<Task<B>>) -> TaskId {
        let id = TaskId::new(self.tasks.len());
        self.tasks.push(task.into());
        id
    }

    /// Require `before` to run earlier than `after`.
    ///
    /// Self-edges and duplicates are ignored. Unknown ids and cycles are
    /// only reported by [`compile`](Self::compile).
    pub fn add_dependency(&mut self, before: TaskId, after: TaskId) {
        if before == after {
            return;
        }
        let exists = self.edges.iter().any(|&edge| edge == (before, after));
        if !exists {
            self.edges.push((before, after));
        }
    }

    /// Create an index provider for `range` slots and register it.
    pub fn add_index_provider(&mut self, range: usize) -> IndexProvider {
        let provider = IndexProvider::new(range);
        self.providers.insert(provider.id());
        provider
    }

    /// Register an externally created index provider so handles indexed by
    /// it pass validation.
    pub fn register_index_provider<I: SlotIndex>(&mut self, provider: &IndexProvider<I>) {
        self.providers.insert(provider.id());
    }

    /// True if the provider is registered with this graph.
    pub fn has_index_provider(&self, id: ProviderId) -> bool {
        self.providers.contains(&id)
    }

    /// Task added under `id`.
    pub fn task(&self, id: TaskId) -> Option<&Task<B>> {
        self.tasks.get(id.index())
    }

    /// Mutable access to the task added under `id`.
    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task<B>> {
        self.tasks.get_mut(id.index())
    }

    /// Tasks that must run before `id`.
    pub fn dependencies(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.edges
            .iter()
            .filter(move |&&(_, after)| after == id)
            .map(|&(before, _)| before)
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> &[Task<B>] {
        &self.tasks
    }

    /// All dependency edges as (before, after) pairs.
    pub fn edges(&self) -> &[(TaskId, TaskId)] {
        &self.edges
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True if no task has been added.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Graph configuration.
    pub fn config(&self) -> &TaskGraphConfig {
        &self.config
    }

    /// Backend the tasks run against.
    pub fn device(&self) -> &Arc<B> {
        &self.device
    }

    /// Validate the graph and freeze it into a [`CompiledGraph`].
    ///
    /// The builder is not modified, so a failed compile can be fixed and
    /// retried.
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownTask`] if an edge names a task not in this graph.
    /// - [`GraphError::Cycle`] with the names along one dependency cycle.
    /// - [`GraphError::MissingResource`], [`GraphError::SlotCountMismatch`]
    ///   or [`GraphError::InvalidBinding`] if a task refers to something that
    ///   cannot resolve.
    pub fn compile(&self) -> Result<CompiledGraph<B>, GraphError> {
        compiler::compile(self)
    }
}

impl<B: Backend> fmt::Debug for TaskGraph<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("label", &self.config.label)
            .field("tasks", &self.tasks)
            .field("edges", &self.edges)
            .finish()
    }
}
