//! Task-graph fragments.
//!
//! A fragment is the DAG built from one queue submission: an optional wait
//! root, the tasks issued from its command buffers and a single retire sink.
//! Nodes only ever depend on nodes added before them, so a fragment is
//! acyclic by construction.
//!
//! Each node keeps an atomic count of unfinished dependencies. Whoever drops
//! the count to zero (a finishing predecessor, a semaphore timepoint, or the
//! submitter releasing its hold) hands the node to the executor. That
//! transition happens exactly once, so every node runs at most once.

use super::payload::TaskPayload;
use super::submission::{Submitter, TaskSubmission};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use taskhal_core::{Arena, Deadline, FragmentId, HalError, QueueId, Result};

struct PendingNode {
    payload: TaskPayload,
    dependents: Vec<usize>,
    pending: usize,
}

/// Collects nodes and edges, then freezes them into a [`Fragment`].
pub struct FragmentBuilder {
    id: FragmentId,
    queue_id: QueueId,
    arena: Arena,
    nodes: Vec<PendingNode>,
}

impl FragmentBuilder {
    /// Start a fragment for `queue_id` backed by `arena`.
    pub fn new(queue_id: QueueId, arena: Arena) -> Self {
        Self {
            id: FragmentId::next(),
            queue_id,
            arena,
            nodes: Vec::new(),
        }
    }

    /// Add a node that runs after every node in `dependencies`.
    ///
    /// Returns the node index. Dependencies must already exist.
    pub fn add(&mut self, payload: TaskPayload, dependencies: &[usize]) -> usize {
        let index = self.nodes.len();
        for &dependency in dependencies {
            self.nodes[dependency].dependents.push(index);
        }
        self.nodes.push(PendingNode {
            payload,
            dependents: Vec::new(),
            pending: dependencies.len(),
        });
        index
    }

    /// Add `count` external holds to a node. Each must be released with
    /// [`TaskRef::release`] before the node can run.
    pub fn hold(&mut self, index: usize, count: usize) {
        self.nodes[index].pending += count;
    }

    /// Arena backing this fragment's transient data.
    pub fn arena_mut(&mut self) -> &mut Arena {
        &mut self.arena
    }

    /// Number of nodes added so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Identifier the built fragment will carry.
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Freeze the graph.
    pub fn build(self) -> Arc<Fragment> {
        let initial_ready = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.pending == 0)
            .map(|(index, _)| index)
            .collect();
        let nodes = self
            .nodes
            .into_iter()
            .map(|node| TaskNode {
                payload: node.payload,
                dependents: node.dependents,
                pending: AtomicUsize::new(node.pending),
            })
            .collect();
        Arc::new(Fragment {
            id: self.id,
            queue_id: self.queue_id,
            nodes,
            initial_ready,
            arena: RwLock::new(self.arena),
            failure: Mutex::new(None),
            completion: Mutex::new(None),
            retired: Condvar::new(),
            created: Instant::now(),
        })
    }
}

pub(crate) struct TaskNode {
    pub(crate) payload: TaskPayload,
    pub(crate) dependents: Vec<usize>,
    pending: AtomicUsize,
}

/// A frozen task graph in flight on the executor.
pub struct Fragment {
    id: FragmentId,
    queue_id: QueueId,
    nodes: Vec<TaskNode>,
    initial_ready: Vec<usize>,
    arena: RwLock<Arena>,
    failure: Mutex<Option<HalError>>,
    completion: Mutex<Option<Result<()>>>,
    retired: Condvar,
    created: Instant,
}

impl Fragment {
    /// Fragment identifier.
    pub fn id(&self) -> FragmentId {
        self.id
    }

    /// Queue the fragment was submitted to.
    pub fn queue_id(&self) -> QueueId {
        self.queue_id
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the fragment has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn node(&self, index: usize) -> &TaskNode {
        &self.nodes[index]
    }

    /// The fragment arena. Tasks read it; registration and retirement write.
    pub fn arena(&self) -> &RwLock<Arena> {
        &self.arena
    }

    /// Nodes with no dependencies and no holds.
    pub fn initial_ready(self: &Arc<Self>) -> TaskSubmission {
        let mut ready = TaskSubmission::new();
        for &index in &self.initial_ready {
            ready.push(TaskRef::new(Arc::clone(self), index));
        }
        ready
    }

    /// Record a failure. The first failure wins; returns whether this one did.
    pub fn fail(&self, error: HalError) -> bool {
        let mut failure = self.failure.lock();
        if failure.is_some() {
            return false;
        }
        *failure = Some(error);
        true
    }

    /// The first failure recorded, if any.
    pub fn failure(&self) -> Option<HalError> {
        self.failure.lock().clone()
    }

    /// Whether a task of this fragment failed.
    pub fn is_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    /// Time since the fragment was built.
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    /// Mark the fragment retired and wake waiters.
    pub(crate) fn finish(&self, result: Result<()>) {
        let mut completion = self.completion.lock();
        if completion.is_none() {
            *completion = Some(result);
        }
        self.retired.notify_all();
    }

    /// Whether the retire task has run.
    pub fn is_retired(&self) -> bool {
        self.completion.lock().is_some()
    }

    /// Block until the retire task ran, returning the fragment status.
    pub fn wait(&self, deadline: Deadline) -> Result<()> {
        let mut completion = self.completion.lock();
        loop {
            if let Some(result) = completion.as_ref() {
                return result.clone();
            }
            match deadline.instant() {
                None => self.retired.wait(&mut completion),
                Some(instant) => {
                    if self.retired.wait_until(&mut completion, instant).timed_out() {
                        return match completion.as_ref() {
                            Some(result) => result.clone(),
                            None => Err(HalError::DeadlineExceeded { pending: 1 }),
                        };
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Fragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fragment")
            .field("id", &self.id)
            .field("queue_id", &self.queue_id)
            .field("nodes", &self.nodes.len())
            .field("failed", &self.is_failed())
            .finish()
    }
}

/// Handle to one node of a fragment.
#[derive(Clone)]
pub struct TaskRef {
    fragment: Arc<Fragment>,
    index: usize,
}

impl TaskRef {
    /// Refer to node `index` of `fragment`.
    pub fn new(fragment: Arc<Fragment>, index: usize) -> Self {
        Self { fragment, index }
    }

    /// The owning fragment.
    pub fn fragment(&self) -> &Arc<Fragment> {
        &self.fragment
    }

    /// Node index inside the fragment.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Payload label of the node.
    pub fn kind(&self) -> &'static str {
        self.fragment.node(self.index).payload.kind()
    }

    /// Unfinished dependencies and holds of the node.
    pub fn pending(&self) -> usize {
        self.fragment.node(self.index).pending.load(Ordering::Acquire)
    }

    /// Satisfy one dependency. Submits the node when it was the last one.
    pub fn release(self, submitter: &Submitter) -> Result<()> {
        let previous = self
            .fragment
            .node(self.index)
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => submitter.submit(self),
            Ok(_) => Ok(()),
            Err(_) => Err(HalError::internal(format!(
                "task {} of {} released more often than it has dependencies",
                self.index, self.fragment.id
            ))),
        }
    }
}

impl std::fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRef")
            .field("fragment", &self.fragment.id)
            .field("index", &self.index)
            .field("kind", &self.kind())
            .finish()
    }
}
