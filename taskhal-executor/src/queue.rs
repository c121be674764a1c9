//! Task queues: turning submissions into fragments.
//!
//! One [`SubmissionBatch`] becomes one fragment:
//!
//! ```text
//!   wait root ──► command buffer 0 tasks ──┐
//!       │                                  ├──► retire
//!       └──────► command buffer 1 tasks ──┘
//! ```
//!
//! The wait root exists only if some wait is not already known reached. It
//! is parked behind a [`WaitGate`], which releases it once every pending wait
//! is reached, or at the first failed wait.
//! Command buffers of one batch share the root and the retire sink and run
//! concurrently with each other. The retire task signals (or, on failure,
//! poisons) the batch's signal semaphores and releases the fragment arena.

use crate::command_buffer::issue::Issuer;
use crate::command_buffer::{CommandBuffer, CommandBufferMode};
use crate::metrics::Metrics;
use crate::queue_state::QueueState;
use crate::semaphore::{SemaphoreList, TimelineSemaphore, WaitGate, timepoint_record};
use crate::task::{BarrierCall, Fragment, FragmentBuilder, Submitter, TaskPayload, TaskRef};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use taskhal_core::logging::{LogCategory, LogCollector, LogEvent};
use taskhal_core::{Arena, ArenaPtr, BlockPool, Deadline, FragmentId, HalError, QueueId, Result};

/// Waits, command buffers and signals submitted together.
#[derive(Debug, Clone, Default)]
pub struct SubmissionBatch {
    waits: SemaphoreList,
    command_buffers: Vec<Arc<CommandBuffer>>,
    signals: SemaphoreList,
}

impl SubmissionBatch {
    /// Empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for `semaphore` to reach `value` before any command runs.
    pub fn wait(mut self, semaphore: &Arc<TimelineSemaphore>, value: u64) -> Self {
        self.waits.push(semaphore, value);
        self
    }

    /// Append a command buffer.
    pub fn command_buffer(mut self, command_buffer: &Arc<CommandBuffer>) -> Self {
        self.command_buffers.push(Arc::clone(command_buffer));
        self
    }

    /// Signal `semaphore` to `value` once every command retired.
    pub fn signal(mut self, semaphore: &Arc<TimelineSemaphore>, value: u64) -> Self {
        self.signals.push(semaphore, value);
        self
    }

    /// Wait pairs.
    pub fn waits(&self) -> &SemaphoreList {
        &self.waits
    }

    /// Signal pairs.
    pub fn signals(&self) -> &SemaphoreList {
        &self.signals
    }

    /// Command buffers, in submission order.
    pub fn command_buffers(&self) -> &[Arc<CommandBuffer>] {
        &self.command_buffers
    }
}

/// Queue state shared with the retire tasks of its fragments.
pub(crate) struct QueueShared {
    id: QueueId,
    state: QueueState,
    in_flight: Mutex<usize>,
    idle: Condvar,
    collector: Arc<dyn LogCollector>,
    metrics: Arc<Metrics>,
}

impl QueueShared {
    fn begin_fragment(&self, fragment: &Fragment) {
        *self.in_flight.lock() += 1;
        self.metrics.record_fragment_submitted();
        self.collector.collect(
            LogEvent::info(LogCategory::Queue, "Fragment submitted")
                .with_queue_id(self.id)
                .with_fragment_id(fragment.id())
                .with_field_u64("tasks", fragment.len() as u64),
        );
    }

    /// Record retirement, publish the result, then drop the in-flight count.
    ///
    /// A fragment ends once; a second end is logged and ignored.
    fn end_fragment(&self, fragment: &Fragment, result: Result<()>) {
        if fragment.is_retired() {
            tracing::warn!(
                queue_id = %self.id,
                fragment_id = %fragment.id(),
                "Fragment already retired"
            );
            return;
        }
        let elapsed = fragment.elapsed();
        self.metrics
            .record_fragment_retired(self.id, result.is_ok(), elapsed.as_secs_f64());
        let event = match &result {
            Ok(()) => LogEvent::info(LogCategory::Fragment, "Fragment retired"),
            Err(err) => LogEvent::error(LogCategory::Fragment, "Fragment failed")
                .with_field("error", err.to_string()),
        };
        self.collector.collect(
            event
                .with_queue_id(self.id)
                .with_fragment_id(fragment.id())
                .with_field_u64("elapsed_us", elapsed.as_micros() as u64),
        );

        fragment.finish(result);

        let mut in_flight = self.in_flight.lock();
        *in_flight -= 1;
        if *in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// The sink of a fragment.
pub struct RetireCall {
    signals: SemaphoreList,
    queue: Arc<QueueShared>,
}

impl RetireCall {
    /// Signal or poison the signal semaphores, release the arena and report
    /// the fragment's result.
    pub(crate) fn retire(&self, fragment: &Fragment) {
        let result = match fragment.failure() {
            None => self.signal_all(fragment),
            Some(failure) => {
                for (semaphore, _) in self.signals.iter() {
                    self.poison(fragment, semaphore, &failure);
                }
                Err(failure)
            }
        };

        match &result {
            Ok(()) => tracing::debug!(
                queue_id = %self.queue.id,
                fragment_id = %fragment.id(),
                signals = self.signals.len(),
                "Fragment retired"
            ),
            Err(err) => tracing::warn!(
                queue_id = %self.queue.id,
                fragment_id = %fragment.id(),
                error = %err,
                "Fragment retired with failure"
            ),
        }

        fragment.arena().write().reset();
        self.queue.end_fragment(fragment, result);
    }

    fn signal_all(&self, fragment: &Fragment) -> Result<()> {
        let mut first_error = None;
        for (semaphore, value) in self.signals.iter() {
            match semaphore.signal(value) {
                Ok(()) => self.queue.state.record_reached(semaphore.id(), value),
                Err(err) => {
                    // A semaphore that cannot be advanced is poisoned so its
                    // waiters observe the error instead of hanging.
                    self.poison(fragment, semaphore, &err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn poison(&self, fragment: &Fragment, semaphore: &TimelineSemaphore, error: &HalError) {
        self.queue.state.forget(semaphore.id());
        semaphore.fail(error.clone());
        self.queue.collector.collect(
            LogEvent::warn(LogCategory::Semaphore, "Signal semaphore failed")
                .with_queue_id(self.queue.id)
                .with_fragment_id(fragment.id())
                .with_semaphore_id(semaphore.id())
                .with_field("error", error.to_string()),
        );
    }
}

/// Host handle to a submitted fragment.
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    fragment: Arc<Fragment>,
}

impl SubmissionHandle {
    /// Identifier of the fragment.
    pub fn fragment_id(&self) -> FragmentId {
        self.fragment.id()
    }

    /// Number of task-graph nodes the submission was issued into.
    pub fn task_count(&self) -> usize {
        self.fragment.len()
    }

    /// Whether the retire task ran.
    pub fn is_retired(&self) -> bool {
        self.fragment.is_retired()
    }

    /// Block until the fragment retired and return its status.
    pub fn wait(&self, deadline: Deadline) -> Result<()> {
        self.fragment.wait(deadline)
    }
}

/// A queue issuing submissions onto the device executor.
pub struct TaskQueue {
    shared: Arc<QueueShared>,
    submitter: Submitter,
    block_pool: Arc<BlockPool>,
    workgroups_per_task: u64,
}

impl TaskQueue {
    pub(crate) fn new(
        id: QueueId,
        submitter: Submitter,
        block_pool: Arc<BlockPool>,
        collector: Arc<dyn LogCollector>,
        metrics: Arc<Metrics>,
        workgroups_per_task: u64,
    ) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                id,
                state: QueueState::new(),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
                collector,
                metrics,
            }),
            submitter,
            block_pool,
            workgroups_per_task,
        }
    }

    /// Queue identifier.
    pub fn id(&self) -> QueueId {
        self.shared.id
    }

    /// Semaphore values this queue knows reached.
    pub fn state(&self) -> &QueueState {
        &self.shared.state
    }

    /// Fragments submitted and not yet retired.
    pub fn in_flight(&self) -> usize {
        *self.shared.in_flight.lock()
    }

    /// Issue `batch` as one fragment.
    ///
    /// Never blocks on semaphores: waits become timepoints. Recording errors
    /// and pool exhaustion are returned before anything is scheduled; a wait
    /// on a poisoned semaphore is reported through the returned handle and
    /// the batch's signal semaphores.
    #[tracing::instrument(
        level = "debug",
        skip(self, batch),
        fields(queue_id = %self.shared.id, command_buffers = batch.command_buffers.len())
    )]
    pub fn submit(&self, batch: SubmissionBatch) -> Result<SubmissionHandle> {
        check_issuable(&batch.command_buffers)?;

        let waits: Vec<(&Arc<TimelineSemaphore>, u64)> = batch
            .waits
            .iter()
            .filter(|(semaphore, value)| !self.shared.state.has_reached(semaphore.id(), *value))
            .collect();

        let (fragment, root, records) = match self.build(&batch, &waits) {
            Ok(built) => built,
            Err(err) => {
                if err.is_retriable() {
                    self.shared.collector.collect(
                        LogEvent::warn(LogCategory::Pool, "Submission deferred")
                            .with_queue_id(self.shared.id)
                            .with_field("error", err.to_string()),
                    );
                }
                return Err(err);
            }
        };
        for command_buffer in &batch.command_buffers {
            command_buffer.mark_issued()?;
        }

        self.shared.begin_fragment(&fragment);
        if let Err(err) = self.schedule(&fragment, root, &waits, records) {
            self.shared.end_fragment(&fragment, Err(err.clone()));
            return Err(err);
        }

        tracing::debug!(
            fragment_id = %fragment.id(),
            tasks = fragment.len(),
            waits = waits.len(),
            "Fragment issued"
        );
        Ok(SubmissionHandle { fragment })
    }

    /// Build the fragment of `batch` and the arena records of its waits.
    fn build(
        &self,
        batch: &SubmissionBatch,
        waits: &[(&Arc<TimelineSemaphore>, u64)],
    ) -> Result<(Arc<Fragment>, Option<usize>, Vec<ArenaPtr>)> {
        let mut builder =
            FragmentBuilder::new(self.shared.id, Arena::new(Arc::clone(&self.block_pool)));
        let root = (!waits.is_empty()).then(|| {
            let root = builder.add(TaskPayload::Barrier(BarrierCall::Wait), &[]);
            builder.hold(root, 1);
            root
        });

        let mut leaves = Vec::new();
        for command_buffer in &batch.command_buffers {
            let mut issuer = Issuer::new(&mut builder, root, self.workgroups_per_task);
            issuer.issue(command_buffer)?;
            leaves.extend(issuer.leaves());
        }
        if leaves.is_empty() {
            leaves.extend(root);
        }
        leaves.sort_unstable();
        leaves.dedup();

        // Allocated up front so registering waits cannot run out of arena.
        let records = waits
            .iter()
            .map(|&(semaphore, value)| {
                builder
                    .arena_mut()
                    .write(&timepoint_record(semaphore.id(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        builder.add(
            TaskPayload::Retire(RetireCall {
                signals: batch.signals.clone(),
                queue: Arc::clone(&self.shared),
            }),
            &leaves,
        );
        Ok((builder.build(), root, records))
    }

    /// Hand the fragment to the executor, parking the wait root behind a
    /// gate over every pending wait.
    fn schedule(
        &self,
        fragment: &Arc<Fragment>,
        root: Option<usize>,
        waits: &[(&Arc<TimelineSemaphore>, u64)],
        records: Vec<ArenaPtr>,
    ) -> Result<()> {
        let Some(root) = root else {
            return self.submitter.submit_all(fragment.initial_ready());
        };

        let gate = WaitGate::new(
            TaskRef::new(Arc::clone(fragment), root),
            self.submitter.clone(),
            waits.len(),
        );
        for (&(semaphore, value), record) in waits.iter().zip(records) {
            match semaphore.enqueue_gate(value, &gate, Some(record)) {
                Ok(Some(id)) => gate.track(semaphore, id),
                Ok(None) => gate.reached()?,
                Err(err) => {
                    tracing::debug!(
                        fragment_id = %fragment.id(),
                        semaphore_id = %semaphore.id(),
                        error = %err,
                        "Wait failed at submission"
                    );
                    self.shared.collector.collect(
                        LogEvent::warn(LogCategory::Semaphore, "Wait on failed semaphore")
                            .with_queue_id(self.shared.id)
                            .with_fragment_id(fragment.id())
                            .with_semaphore_id(semaphore.id())
                            .with_field("error", err.to_string()),
                    );
                    // The fragment drains without running its work and
                    // poisons its own signals.
                    return gate.failed(&err);
                }
            }
        }
        Ok(())
    }

    /// Block until every fragment submitted to this queue retired.
    #[tracing::instrument(level = "debug", skip(self), fields(queue_id = %self.shared.id))]
    pub fn wait_idle(&self, deadline: Deadline) -> Result<()> {
        let mut in_flight = self.shared.in_flight.lock();
        while *in_flight > 0 {
            match deadline.instant() {
                None => self.shared.idle.wait(&mut in_flight),
                Some(instant) => {
                    if self
                        .shared
                        .idle
                        .wait_until(&mut in_flight, instant)
                        .timed_out()
                        && *in_flight > 0
                    {
                        return Err(HalError::QueueBusy {
                            queue_id: self.shared.id,
                            in_flight: *in_flight,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Fail unless every command buffer can be issued, counting one-shot
/// buffers listed more than once.
fn check_issuable(command_buffers: &[Arc<CommandBuffer>]) -> Result<()> {
    for (index, command_buffer) in command_buffers.iter().enumerate() {
        command_buffer.check_issuable()?;
        let repeated = command_buffers[..index]
            .iter()
            .any(|earlier| Arc::ptr_eq(earlier, command_buffer));
        if repeated && command_buffer.mode() == CommandBufferMode::OneShot {
            return Err(HalError::CommandBufferState {
                expected: "not yet issued".to_string(),
                actual: "listed twice in one batch".to_string(),
            });
        }
    }
    Ok(())
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.shared.id)
            .field("in_flight", &self.in_flight())
            .field("workgroups_per_task", &self.workgroups_per_task)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskhal_core::logging::{BufferedCollector, LogLevel};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn queue() -> (TaskQueue, UnboundedReceiver<TaskRef>, Arc<BufferedCollector>) {
        queue_with_pool(Arc::new(BlockPool::new(1024, 8)))
    }

    fn queue_with_pool(
        pool: Arc<BlockPool>,
    ) -> (TaskQueue, UnboundedReceiver<TaskRef>, Arc<BufferedCollector>) {
        let (submitter, rx) = Submitter::channel();
        let collector = Arc::new(BufferedCollector::new(64));
        let queue = TaskQueue::new(
            QueueId::new(0),
            submitter,
            pool,
            collector.clone(),
            Arc::new(Metrics::new().unwrap()),
            64,
        );
        (queue, rx, collector)
    }

    fn ended() -> Arc<CommandBuffer> {
        let cb = CommandBuffer::new(CommandBufferMode::OneShot);
        cb.end().unwrap();
        Arc::new(cb)
    }

    /// Run ready tasks inline until the channel is empty.
    fn drain(rx: &mut UnboundedReceiver<TaskRef>, submitter: &Submitter) {
        while let Ok(task) = rx.try_recv() {
            let fragment = Arc::clone(task.fragment());
            let node = fragment.node(task.index());
            node.payload.run(&fragment).unwrap();
            for &dependent in &node.dependents {
                TaskRef::new(Arc::clone(&fragment), dependent)
                    .release(submitter)
                    .unwrap();
            }
        }
    }

    #[test]
    fn waits_park_the_fragment_until_signaled() {
        let (queue, mut rx, collector) = queue();
        let wait = TimelineSemaphore::new(0);
        let signal = TimelineSemaphore::new(0);
        let handle = queue
            .submit(
                SubmissionBatch::new()
                    .wait(&wait, 1)
                    .command_buffer(&ended())
                    .signal(&signal, 1),
            )
            .unwrap();
        assert_eq!(handle.task_count(), 2);
        assert_eq!(queue.in_flight(), 1);
        drain(&mut rx, &queue.submitter);
        assert!(!handle.is_retired());

        wait.signal(1).unwrap();
        drain(&mut rx, &queue.submitter);
        handle.wait(Deadline::Immediate).unwrap();
        assert_eq!(signal.query().unwrap(), 1);
        assert!(queue.state().has_reached(signal.id(), 1));
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(collector.by_queue(queue.id()).len(), 2);
    }

    #[test]
    fn known_reached_waits_are_elided() {
        let (queue, mut rx, _) = queue();
        let semaphore = TimelineSemaphore::new(0);
        queue.state().record_reached(semaphore.id(), 3);

        let handle = queue
            .submit(SubmissionBatch::new().wait(&semaphore, 2))
            .unwrap();
        // Only the retire task.
        assert_eq!(handle.task_count(), 1);
        assert_eq!(semaphore.pending_timepoints(), 0);
        drain(&mut rx, &queue.submitter);
        assert!(handle.is_retired());
    }

    #[test]
    fn poisoned_wait_fails_fragment_and_signals() {
        let (queue, mut rx, _) = queue();
        let wait = TimelineSemaphore::new(0);
        wait.fail(HalError::internal("upstream"));
        let signal = TimelineSemaphore::new(0);

        let handle = queue
            .submit(SubmissionBatch::new().wait(&wait, 1).signal(&signal, 1))
            .unwrap();
        drain(&mut rx, &queue.submitter);
        assert_eq!(
            handle.wait(Deadline::Immediate),
            Err(HalError::internal("upstream"))
        );
        assert_eq!(signal.query(), Err(HalError::internal("upstream")));
    }

    #[test]
    fn poisoned_wait_does_not_wait_for_the_others() {
        let (queue, mut rx, collector) = queue();
        let poisoned = TimelineSemaphore::new(0);
        poisoned.fail(HalError::internal("upstream"));
        let never = TimelineSemaphore::new(0);
        let signal = TimelineSemaphore::new(0);

        let handle = queue
            .submit(
                SubmissionBatch::new()
                    .wait(&never, 1)
                    .wait(&poisoned, 1)
                    .command_buffer(&ended())
                    .signal(&signal, 1),
            )
            .unwrap();
        drain(&mut rx, &queue.submitter);
        assert_eq!(
            handle.wait(Deadline::Immediate),
            Err(HalError::internal("upstream"))
        );
        assert_eq!(signal.query(), Err(HalError::internal("upstream")));
        assert_eq!(never.pending_timepoints(), 0);
        assert_eq!(queue.in_flight(), 0);

        assert_eq!(collector.by_semaphore(poisoned.id()).len(), 1);
        assert_eq!(collector.by_semaphore(signal.id()).len(), 1);
    }

    #[test]
    fn wait_failed_after_submission_releases_the_fragment() {
        let (queue, mut rx, _) = queue();
        let first = TimelineSemaphore::new(0);
        let second = TimelineSemaphore::new(0);
        let signal = TimelineSemaphore::new(0);

        let handle = queue
            .submit(
                SubmissionBatch::new()
                    .wait(&first, 1)
                    .wait(&second, 1)
                    .signal(&signal, 1),
            )
            .unwrap();
        first.signal(1).unwrap();
        drain(&mut rx, &queue.submitter);
        assert!(!handle.is_retired());

        second.fail(HalError::internal("kernel fault"));
        drain(&mut rx, &queue.submitter);
        assert_eq!(
            handle.wait(Deadline::Immediate),
            Err(HalError::internal("kernel fault"))
        );
        assert_eq!(signal.query(), Err(HalError::internal("kernel fault")));
    }

    #[test]
    fn waits_span_several_arena_blocks() {
        let pool = Arc::new(BlockPool::new(64, 2));
        let (queue, mut rx, _) = queue_with_pool(Arc::clone(&pool));
        let semaphores: Vec<_> = (0..5).map(|_| TimelineSemaphore::new(0)).collect();
        let signal = TimelineSemaphore::new(0);
        let batch = semaphores
            .iter()
            .fold(SubmissionBatch::new(), |batch, semaphore| {
                batch.wait(semaphore, 1)
            })
            .signal(&signal, 1);

        let handle = queue.submit(batch).unwrap();
        assert_eq!(pool.in_use(), 2);
        for semaphore in &semaphores {
            drain(&mut rx, &queue.submitter);
            assert!(!handle.is_retired());
            semaphore.signal(1).unwrap();
        }
        drain(&mut rx, &queue.submitter);
        handle.wait(Deadline::Immediate).unwrap();
        assert_eq!(signal.query().unwrap(), 1);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn exhausted_wait_records_schedule_nothing() {
        let pool = Arc::new(BlockPool::new(64, 1));
        let (queue, mut rx, collector) = queue_with_pool(Arc::clone(&pool));
        let semaphores: Vec<_> = (0..5).map(|_| TimelineSemaphore::new(0)).collect();
        let signal = TimelineSemaphore::new(0);
        let cb = ended();
        let batch = semaphores
            .iter()
            .fold(SubmissionBatch::new(), |batch, semaphore| {
                batch.wait(semaphore, 1)
            })
            .command_buffer(&cb)
            .signal(&signal, 1);

        let err = queue.submit(batch).unwrap_err();
        assert!(matches!(err, HalError::BlockPoolExhausted { capacity: 1, .. }));
        assert!(err.is_retriable());
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(pool.in_use(), 0);
        assert!(!cb.is_issued());
        assert!(semaphores.iter().all(|s| s.pending_timepoints() == 0));
        assert_eq!(signal.query().unwrap(), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(collector.by_level(LogLevel::Warn).len(), 1);
    }

    #[test]
    fn one_shot_listed_twice_is_rejected() {
        let (queue, mut rx, _) = queue();
        let cb = ended();
        let err = queue
            .submit(SubmissionBatch::new().command_buffer(&cb).command_buffer(&cb))
            .unwrap_err();
        assert_eq!(err.code(), "E305");
        assert!(!cb.is_issued());
        assert_eq!(queue.in_flight(), 0);

        let reusable = CommandBuffer::new(CommandBufferMode::Reusable);
        reusable.end().unwrap();
        let reusable = Arc::new(reusable);
        let handle = queue
            .submit(
                SubmissionBatch::new()
                    .command_buffer(&reusable)
                    .command_buffer(&reusable),
            )
            .unwrap();
        drain(&mut rx, &queue.submitter);
        handle.wait(Deadline::Immediate).unwrap();
    }

    #[test]
    fn closed_executor_ends_the_fragment_once() {
        let (queue, rx, _) = queue();
        drop(rx);
        // Reached, but not known to the queue: the gate opens during submit.
        let semaphore = TimelineSemaphore::new(1);
        let signal = TimelineSemaphore::new(0);
        let err = queue
            .submit(SubmissionBatch::new().wait(&semaphore, 1).signal(&signal, 1))
            .unwrap_err();
        assert_eq!(err, HalError::ExecutorShutdown);
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.shared.metrics.fragments_in_flight.get(), 0);
        assert_eq!(signal.query().unwrap(), 0);
    }

    #[test]
    fn unended_command_buffer_is_rejected() {
        let (queue, _rx, _) = queue();
        let cb = Arc::new(CommandBuffer::new(CommandBufferMode::OneShot));
        let err = queue
            .submit(SubmissionBatch::new().command_buffer(&cb))
            .unwrap_err();
        assert!(err.is_invalid_argument());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn wait_idle_times_out_while_busy() {
        let (queue, mut rx, _) = queue();
        let wait = TimelineSemaphore::new(0);
        queue.submit(SubmissionBatch::new().wait(&wait, 1)).unwrap();
        let err = queue.wait_idle(Deadline::Immediate).unwrap_err();
        assert_eq!(err.code(), "E402");

        wait.signal(1).unwrap();
        drain(&mut rx, &queue.submitter);
        queue.wait_idle(Deadline::Immediate).unwrap();
    }
}
