//! Task graph compilation.
//!
//! Compiling a [`TaskGraph`] runs four steps:
//!
//! 1. **Edge check** - every edge must name tasks of this graph
//! 2. **Topological sort** - Kahn's algorithm; when several tasks are ready
//!    the one added first wins, so the order is reproducible
//! 3. **Binding validation** - every resource a task refers to must be able
//!    to resolve, and indexed handles must match their provider
//! 4. **Semaphore wiring** - each signalled semaphore becomes a wait of the
//!    first downstream task able to wait on it
//!
//! The builder is only read. All wiring happens on copies of its tasks.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use super::{CompiledGraph, TaskGraph, TaskId};
use crate::backend::Backend;
use crate::error::GraphError;
use crate::provider::ProviderId;
use crate::resource::BindingState;
use crate::task::{Capabilities, Task};

pub(super) fn compile<B: Backend>(graph: &TaskGraph<B>) -> Result<CompiledGraph<B>, GraphError> {
    let tasks = graph.tasks();
    check_edges(tasks.len(), graph.edges())?;

    let successors = successor_lists(tasks.len(), graph.edges());
    let order = topological_order(&successors).map_err(|remaining| {
        let names = find_cycle(&remaining, graph.edges())
            .into_iter()
            .map(|i| tasks[i].name().to_string())
            .collect();
        GraphError::Cycle(names)
    })?;

    for task in tasks {
        validate_task(graph, task)?;
    }
    check_index_writers(tasks)?;

    let mut wired: Vec<Task<B>> = tasks.to_vec();
    let links = wire_semaphores(&mut wired, &successors, &order)?;

    log::debug!(
        "{}: compiled {} tasks, {} edges, {} semaphore links",
        graph.config().label,
        tasks.len(),
        graph.edges().len(),
        links
    );

    let mut slots: Vec<Option<Task<B>>> = wired.into_iter().map(Some).collect();
    let ordered = order.iter().filter_map(|&i| slots[i].take()).collect();
    let order = order.into_iter().map(TaskId::new).collect();

    Ok(CompiledGraph::new(
        Arc::clone(graph.device()),
        graph.config().clone(),
        ordered,
        order,
    ))
}

fn check_edges(len: usize, edges: &[(TaskId, TaskId)]) -> Result<(), GraphError> {
    for &(before, after) in edges {
        for id in [before, after] {
            if id.index() >= len {
                return Err(GraphError::UnknownTask(id));
            }
        }
    }
    Ok(())
}

fn successor_lists(len: usize, edges: &[(TaskId, TaskId)]) -> Vec<Vec<usize>> {
    let mut successors = vec![Vec::new(); len];
    for &(before, after) in edges {
        successors[before.index()].push(after.index());
    }
    successors
}

/// Kahn's algorithm with a min-heap as the ready set.
///
/// On failure returns the in-degrees left over; every task with a non-zero
/// count is on or behind a cycle.
fn topological_order(successors: &[Vec<usize>]) -> Result<Vec<usize>, Vec<u32>> {
    let n = successors.len();
    let mut in_degree = vec![0u32; n];
    for next in successors.iter().flatten() {
        in_degree[*next] += 1;
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| in_degree[i] == 0)
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);

    while let Some(Reverse(node)) = ready.pop() {
        order.push(node);
        for &next in &successors[node] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(in_degree)
    }
}

/// Extract one concrete cycle from the tasks Kahn's algorithm could not
/// order. The result starts and ends with the same task.
fn find_cycle(in_degree: &[u32], edges: &[(TaskId, TaskId)]) -> Vec<usize> {
    // Every remaining task has at least one remaining predecessor, so
    // walking predecessors must revisit a task.
    let remaining = |i: usize| in_degree[i] > 0;
    let predecessor = |node: usize| {
        edges
            .iter()
            .find(|&&(before, after)| after.index() == node && remaining(before.index()))
            .map(|&(before, _)| before.index())
    };

    let Some(start) = (0..in_degree.len()).find(|&i| remaining(i)) else {
        return Vec::new();
    };

    let mut position = vec![None; in_degree.len()];
    let mut path = Vec::new();
    let mut node = start;
    while position[node].is_none() {
        position[node] = Some(path.len());
        path.push(node);
        match predecessor(node) {
            Some(prev) => node = prev,
            None => return path,
        }
    }

    let mut cycle: Vec<usize> = path.split_off(position[node].unwrap_or(0));
    cycle.reverse();
    if let Some(first) = cycle.iter().enumerate().min_by_key(|&(_, &i)| i).map(|(p, _)| p) {
        cycle.rotate_left(first);
    }
    if let Some(&first) = cycle.first() {
        cycle.push(first);
    }
    cycle
}

fn missing(task: &Task<impl Backend>, resource: &str, reason: impl Into<String>) -> GraphError {
    GraphError::MissingResource {
        task: task.name().to_string(),
        resource: resource.to_string(),
        reason: reason.into(),
    }
}

fn invalid(task: &Task<impl Backend>, reason: impl Into<String>) -> GraphError {
    GraphError::InvalidBinding {
        task: task.name().to_string(),
        reason: reason.into(),
    }
}

fn validate_task<B: Backend>(graph: &TaskGraph<B>, task: &Task<B>) -> Result<(), GraphError> {
    for (label, provider) in task.index_providers() {
        if !graph.has_index_provider(provider) {
            return Err(missing(
                task,
                label,
                format!("{provider} is not registered with this graph"),
            ));
        }
    }

    for binding in task.bindings() {
        match binding.state {
            BindingState::Unbound if binding.required => {
                return Err(missing(task, &binding.label, "handle is not bound"));
            }
            BindingState::Unbound | BindingState::Fixed { alive: true } => {}
            BindingState::Fixed { alive: false } => {
                return Err(missing(task, &binding.label, "referenced object was dropped"));
            }
            BindingState::Indexed {
                provider,
                range,
                slots,
                live,
            } => {
                if !graph.has_index_provider(provider) {
                    return Err(missing(
                        task,
                        &binding.label,
                        format!("indexed by {provider}, which is not registered with this graph"),
                    ));
                }
                if slots != range {
                    return Err(GraphError::SlotCountMismatch {
                        resource: format!("{}: {}", task.name(), binding.label),
                        slots,
                        range,
                    });
                }
                if live < slots {
                    return Err(missing(
                        task,
                        &binding.label,
                        format!("{} of {} slots were dropped", slots - live, slots),
                    ));
                }
            }
        }
    }

    match task {
        Task::Acquire(acquire) => {
            if acquire.signal().index_provider_id() == Some(acquire.index().id()) {
                return Err(invalid(
                    task,
                    "signal semaphore is indexed by the provider this task writes",
                ));
            }
        }
        Task::Submit(submit) if submit.command_buffer_count() == 0 => {
            return Err(invalid(task, "submit has no command buffers"));
        }
        _ => {}
    }
    Ok(())
}

/// Each index provider may be written by at most one task.
fn check_index_writers<B: Backend>(tasks: &[Task<B>]) -> Result<(), GraphError> {
    let mut writers: HashMap<ProviderId, &str> = HashMap::new();
    for task in tasks {
        let Some(provider) = task.written_index() else {
            continue;
        };
        if let Some(other) = writers.insert(provider, task.name()) {
            return Err(invalid(
                task,
                format!("{provider} is already written by '{other}'"),
            ));
        }
    }
    Ok(())
}

/// Hand every signalled semaphore to exactly one downstream awaiting task.
///
/// The search stops at the first awaiting task on each path. Semaphores are
/// binary, so of the nearest awaiters only the earliest in `order` waits. Every
/// other nearest awaiter must run after it; otherwise the signal would have to
/// be consumed twice and the graph is rejected. Returns the number of waits
/// added.
fn wire_semaphores<B: Backend>(
    tasks: &mut [Task<B>],
    successors: &[Vec<usize>],
    order: &[usize],
) -> Result<usize, GraphError> {
    let mut rank = vec![0; tasks.len()];
    for (position, &task) in order.iter().enumerate() {
        rank[task] = position;
    }

    let mut links = 0;
    for &signaller in order {
        let Some(semaphore) = tasks[signaller].signal_semaphore().cloned() else {
            continue;
        };

        let awaiters = nearest_awaiters(tasks, successors, signaller);
        let Some(&waiter) = awaiters.iter().min_by_key(|&&i| rank[i]) else {
            log::warn!(
                "'{}' signals a semaphore that no downstream task waits on",
                tasks[signaller].name()
            );
            continue;
        };
        if let Some(&other) = awaiters
            .iter()
            .find(|&&i| i != waiter && !reaches(successors, waiter, i))
        {
            return Err(invalid(
                &tasks[signaller],
                format!(
                    "signal semaphore would be waited on by both '{}' and '{}'",
                    tasks[waiter].name(),
                    tasks[other].name()
                ),
            ));
        }

        if tasks[waiter].add_derived_wait(semaphore) {
            links += 1;
            log::trace!(
                "'{}' waits on the semaphore of '{}'",
                tasks[waiter].name(),
                tasks[signaller].name()
            );
        }
    }
    Ok(links)
}

/// Awaiting tasks downstream of `signaller` with no other awaiter between.
fn nearest_awaiters<B: Backend>(
    tasks: &[Task<B>],
    successors: &[Vec<usize>],
    signaller: usize,
) -> Vec<usize> {
    let mut visited = vec![false; tasks.len()];
    let mut queue: VecDeque<usize> = successors[signaller].iter().copied().collect();
    let mut awaiters = Vec::new();

    while let Some(node) = queue.pop_front() {
        if std::mem::replace(&mut visited[node], true) {
            continue;
        }
        if tasks[node].capabilities().contains(Capabilities::AWAIT_SEMAPHORE) {
            awaiters.push(node);
            continue;
        }
        queue.extend(successors[node].iter().copied());
    }
    awaiters
}

fn reaches(successors: &[Vec<usize>], from: usize, to: usize) -> bool {
    let mut visited = vec![false; successors.len()];
    let mut stack = vec![from];
    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !std::mem::replace(&mut visited[node], true) {
            stack.extend(successors[node].iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::DummyBackend;
    use crate::resource::ResourceHandle;
    use crate::task::{AcquireTask, CustomTask, PresentTask, RenderTask, SubmitTask};

    fn noop(name: &str) -> CustomTask<DummyBackend> {
        CustomTask::new(name, |_| Ok(()))
    }

    fn graph() -> TaskGraph<DummyBackend> {
        TaskGraph::new(Arc::new(DummyBackend::new()))
    }

    fn position(order: &[TaskId], id: TaskId) -> usize {
        order.iter().position(|&x| x == id).unwrap()
    }

    #[test]
    fn test_compile_empty_graph() {
        let compiled = graph().compile().unwrap();
        assert!(compiled.is_empty());
        assert_eq!(compiled.len(), 0);
    }

    #[test]
    fn test_compile_single_task() {
        let mut graph = graph();
        let a = graph.add_task(noop("a"));
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), &[a]);
    }

    #[test]
    fn test_compile_linear_chain() {
        // Added in reverse so insertion order alone would be wrong.
        let mut graph = graph();
        let c = graph.add_task(noop("c"));
        let b = graph.add_task(noop("b"));
        let a = graph.add_task(noop("a"));
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), &[a, b, c]);
        assert_eq!(compiled.task_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_compile_ties_follow_insertion_order() {
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D
        let mut graph = graph();
        let d = graph.add_task(noop("d"));
        let c = graph.add_task(noop("c"));
        let b = graph.add_task(noop("b"));
        let a = graph.add_task(noop("a"));
        graph.add_dependency(a, b);
        graph.add_dependency(a, c);
        graph.add_dependency(b, d);
        graph.add_dependency(c, d);

        let compiled = graph.compile().unwrap();
        // c was added before b, so it wins the tie.
        assert_eq!(compiled.order(), &[a, c, b, d]);
    }

    #[test]
    fn test_compile_independent_tasks_keep_insertion_order() {
        let mut graph = graph();
        let ids: Vec<TaskId> = ["x", "y", "z"].iter().map(|n| graph.add_task(noop(n))).collect();
        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.order(), ids.as_slice());
    }

    #[test]
    fn test_compile_respects_every_edge() {
        let mut graph = graph();
        let ids: Vec<TaskId> = (0..8).map(|i| graph.add_task(noop(&format!("t{i}")))).collect();
        let edges = [(7, 0), (6, 1), (0, 1), (5, 3), (3, 2), (1, 2), (4, 7)];
        for (before, after) in edges {
            graph.add_dependency(ids[before], ids[after]);
        }

        let compiled = graph.compile().unwrap();
        assert_eq!(compiled.len(), 8);
        for (before, after) in edges {
            let order = compiled.order();
            assert!(position(order, ids[before]) < position(order, ids[after]));
        }
    }

    #[test]
    fn test_compile_cycle_two_nodes() {
        let mut graph = graph();
        let a = graph.add_task(noop("a"));
        let b = graph.add_task(noop("b"));
        graph.add_dependency(a, b);
        graph.add_dependency(b, a);

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::Cycle(vec!["a".into(), "b".into(), "a".into()])
        );
    }

    #[test]
    fn test_compile_partial_cycle_names_only_cycle() {
        // d -> a, and a -> b -> c -> a
        let mut graph = graph();
        let d = graph.add_task(noop("d"));
        let a = graph.add_task(noop("a"));
        let b = graph.add_task(noop("b"));
        let c = graph.add_task(noop("c"));
        let e = graph.add_task(noop("e"));
        graph.add_dependency(d, a);
        graph.add_dependency(a, b);
        graph.add_dependency(b, c);
        graph.add_dependency(c, a);
        graph.add_dependency(c, e);

        let err = graph.compile().unwrap_err();
        assert_eq!(
            err,
            GraphError::Cycle(vec!["a".into(), "b".into(), "c".into(), "a".into()])
        );
    }

    #[test]
    fn test_compile_unknown_task() {
        let mut other = graph();
        other.add_task(noop("x"));
        let foreign = other.add_task(noop("y"));

        let mut graph = graph();
        let a = graph.add_task(noop("a"));
        graph.add_dependency(a, foreign);

        assert_eq!(graph.compile().unwrap_err(), GraphError::UnknownTask(foreign));
    }

    #[test]
    fn test_failed_compile_leaves_builder_usable() {
        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(2);
        let external = crate::provider::IndexProvider::new(2);

        let mut graph = TaskGraph::new(Arc::clone(&backend));
        graph.add_task(AcquireTask::<DummyBackend>::new("acquire", &surface, &external));

        let err = graph.compile().unwrap_err();
        assert!(matches!(
            err,
            GraphError::MissingResource { ref resource, .. } if resource == "index"
        ));

        graph.register_index_provider(&external);
        assert_eq!(graph.compile().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_required_resource() {
        let backend = Arc::new(DummyBackend::new());
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        graph.add_task(RenderTask::<DummyBackend>::new(
            "draw",
            ResourceHandle::Unbound,
            |_| Ok(()),
        ));

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::MissingResource {
                task: "draw".into(),
                resource: "command buffer".into(),
                reason: "handle is not bound".into(),
            }
        );
    }

    #[test]
    fn test_dropped_fixed_resource() {
        let backend = Arc::new(DummyBackend::new());
        let buffer = backend.create_command_buffer("main");
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        graph.add_task(RenderTask::<DummyBackend>::new("draw", &buffer, |_| Ok(())));
        drop(buffer);

        assert!(matches!(
            graph.compile().unwrap_err(),
            GraphError::MissingResource { ref reason, .. }
                if reason == "referenced object was dropped"
        ));
    }

    #[test]
    fn test_unregistered_provider_for_indexed_handle() {
        let backend = Arc::new(DummyBackend::new());
        let buffers = backend.create_command_buffers("frame", 2);
        let index = crate::provider::IndexProvider::new(2);
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        graph.add_task(RenderTask::<DummyBackend>::new(
            "draw",
            ResourceHandle::indexed(&buffers, &index),
            |_| Ok(()),
        ));

        assert!(matches!(
            graph.compile().unwrap_err(),
            GraphError::MissingResource { ref resource, .. } if resource == "command buffer"
        ));
    }

    #[test]
    fn test_slot_count_mismatch() {
        let backend = Arc::new(DummyBackend::new());
        let buffers = backend.create_command_buffers("frame", 2);
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let index = graph.add_index_provider(3);
        graph.add_task(RenderTask::<DummyBackend>::new(
            "draw",
            ResourceHandle::indexed(&buffers, &index),
            |_| Ok(()),
        ));

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::SlotCountMismatch {
                resource: "draw: command buffer".into(),
                slots: 2,
                range: 3,
            }
        );
    }

    #[test]
    fn test_acquire_semaphore_indexed_by_own_provider() {
        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(2);
        let semaphores = backend.create_semaphores(2);
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let image = graph.add_index_provider(2);
        graph.add_task(
            AcquireTask::<DummyBackend>::new("acquire", &surface, &image)
                .with_signal(ResourceHandle::indexed(&semaphores, &image)),
        );

        assert!(matches!(
            graph.compile().unwrap_err(),
            GraphError::InvalidBinding { ref task, .. } if task == "acquire"
        ));
    }

    #[test]
    fn test_two_acquires_one_provider() {
        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(2);
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let image = graph.add_index_provider(2);
        graph.add_task(AcquireTask::<DummyBackend>::new("first", &surface, &image));
        graph.add_task(AcquireTask::<DummyBackend>::new("second", &surface, &image));

        assert!(matches!(
            graph.compile().unwrap_err(),
            GraphError::InvalidBinding { ref task, .. } if task == "second"
        ));
    }

    #[test]
    fn test_submit_without_command_buffers() {
        let backend = Arc::new(DummyBackend::new());
        let queue = backend.create_queue("graphics");
        let mut graph = TaskGraph::new(Arc::clone(&backend));
        graph.add_task(SubmitTask::<DummyBackend>::new("submit", &queue));

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::InvalidBinding {
                task: "submit".into(),
                reason: "submit has no command buffers".into(),
            }
        );
    }

    #[test]
    fn test_semaphore_wiring_stops_at_first_awaiter() {
        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(2);
        let queue = backend.create_queue("graphics");
        let buffer = backend.create_command_buffer("main");
        let image_ready = backend.create_semaphore();
        let render_done = backend.create_semaphore();

        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let image = graph.add_index_provider(2);
        let acquire = graph.add_task(
            AcquireTask::<DummyBackend>::new("acquire", &surface, &image).with_signal(&image_ready),
        );
        let render = graph.add_task(RenderTask::<DummyBackend>::new("render", &buffer, |_| Ok(())));
        let submit = graph.add_task(
            SubmitTask::<DummyBackend>::new("submit", &queue)
                .with_command_buffer(&buffer)
                .with_signal(&render_done),
        );
        let present = graph.add_task(PresentTask::<DummyBackend>::new(
            "present", &queue, &surface, &image,
        ));
        graph.add_dependency(acquire, render);
        graph.add_dependency(render, submit);
        graph.add_dependency(submit, present);
        // Present also follows acquire directly, but submit consumes the
        // image semaphore first.
        graph.add_dependency(acquire, present);

        let mut compiled = graph.compile().unwrap();
        assert_eq!(compiled.task_names(), vec!["acquire", "render", "submit", "present"]);

        let tasks = compiled.tasks();
        let submit_waits = tasks[2].derived_waits();
        assert_eq!(submit_waits.len(), 1);
        assert!(submit_waits[0].ptr_eq(&ResourceHandle::fixed(&image_ready)));

        let present_waits = tasks[3].derived_waits();
        assert_eq!(present_waits.len(), 1);
        assert!(present_waits[0].ptr_eq(&ResourceHandle::fixed(&render_done)));

        // The builder's tasks are untouched.
        assert!(graph.task(submit).unwrap().derived_waits().is_empty());

        for _ in 0..3 {
            compiled.execute().unwrap();
        }
        assert!(!image_ready.is_signaled());
        assert!(!render_done.is_signaled());
    }

    #[test]
    fn test_semaphore_with_unordered_awaiters_rejected() {
        let backend = Arc::new(DummyBackend::new());
        let surface = backend.create_surface(2);
        let queue = backend.create_queue("graphics");
        let shadows = backend.create_command_buffer("shadows");
        let scene = backend.create_command_buffer("scene");
        let image_ready = backend.create_semaphore();

        let mut graph = TaskGraph::new(Arc::clone(&backend));
        let image = graph.add_index_provider(2);
        let acquire = graph.add_task(
            AcquireTask::<DummyBackend>::new("acquire", &surface, &image).with_signal(&image_ready),
        );
        let first = graph.add_task(
            SubmitTask::<DummyBackend>::new("submit shadows", &queue).with_command_buffer(&shadows),
        );
        let second = graph.add_task(
            SubmitTask::<DummyBackend>::new("submit scene", &queue).with_command_buffer(&scene),
        );
        graph.add_dependency(acquire, first);
        graph.add_dependency(acquire, second);

        assert_eq!(
            graph.compile().unwrap_err(),
            GraphError::InvalidBinding {
                task: "acquire".into(),
                reason: "signal semaphore would be waited on by both 'submit shadows' and \
                         'submit scene'"
                    .into(),
            }
        );

        // Ordering the submits lets the first one consume the signal.
        graph.add_dependency(first, second);
        let mut compiled = graph.compile().unwrap();
        assert_eq!(compiled.tasks()[1].derived_waits().len(), 1);
        assert!(compiled.tasks()[2].derived_waits().is_empty());
        compiled.execute().unwrap();
    }
}
