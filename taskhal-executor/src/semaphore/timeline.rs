//! Emulated timeline semaphores.

use super::wait_gate::WaitGate;
use crate::task::{Submitter, TaskRef};
use parking_lot::Mutex;
use std::sync::Arc;
use taskhal_core::{Arena, ArenaPtr, Event, EventToken, HalError, Result, SemaphoreId};

/// Bytes of the arena record kept for every task timepoint.
pub const TIMEPOINT_RECORD_SIZE: usize = 16;

/// Identifier of a registered timepoint, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimepointId(u64);

/// What happens when a timepoint is reached or failed.
enum Notify {
    /// Release one dependency of a task-graph node.
    Task { task: TaskRef, submitter: Submitter },
    /// Count down a node's wait gate.
    Gate { gate: Arc<WaitGate> },
    /// Signal a host waiter's pooled event.
    Event { event: Event, token: EventToken },
}

struct Timepoint {
    id: TimepointId,
    minimum_value: u64,
    notify: Notify,
    /// Record in the fragment arena; lives exactly as long as the fragment.
    record: Option<ArenaPtr>,
}

impl Timepoint {
    fn reached(self) {
        tracing::trace!(
            minimum_value = self.minimum_value,
            record = ?self.record,
            "Timepoint reached"
        );
        match self.notify {
            Notify::Task { task, submitter } => {
                if let Err(err) = task.release(&submitter) {
                    tracing::warn!(error = %err, "Dropping task released by semaphore");
                }
            }
            Notify::Gate { gate } => {
                if let Err(err) = gate.reached() {
                    tracing::warn!(error = %err, "Dropping task released by semaphore");
                }
            }
            Notify::Event { event, token } => {
                event.set(token);
            }
        }
    }

    fn failed(self, error: &HalError) {
        match self.notify {
            Notify::Task { task, submitter } => {
                // The waiting fragment is poisoned, then allowed to drain so
                // its retire task propagates the failure.
                task.fragment().fail(error.clone());
                if let Err(err) = task.release(&submitter) {
                    tracing::warn!(error = %err, "Dropping task released by semaphore");
                }
            }
            Notify::Gate { gate } => {
                if let Err(err) = gate.failed(error) {
                    tracing::warn!(error = %err, "Dropping task released by semaphore");
                }
            }
            Notify::Event { event, token } => {
                event.fail(token, error.clone());
            }
        }
    }
}

struct SemaphoreState {
    current_value: u64,
    failure: Option<HalError>,
    timepoints: Vec<Timepoint>,
    next_timepoint: u64,
}

impl SemaphoreState {
    fn push(
        &mut self,
        minimum_value: u64,
        notify: Notify,
        record: Option<ArenaPtr>,
    ) -> TimepointId {
        let id = TimepointId(self.next_timepoint);
        self.next_timepoint += 1;
        self.timepoints.push(Timepoint {
            id,
            minimum_value,
            notify,
            record,
        });
        id
    }
}

/// A monotonically increasing 64-bit counter with a waiter list.
///
/// Waiting never blocks a worker: a task that must wait for a value is parked
/// as a timepoint and handed back to the executor when [`signal`] reaches it.
/// The state lock is only held to update the counter and the waiter list;
/// notifications run after it is released.
///
/// [`signal`]: TimelineSemaphore::signal
pub struct TimelineSemaphore {
    id: SemaphoreId,
    state: Mutex<SemaphoreState>,
}

impl TimelineSemaphore {
    /// Create a semaphore starting at `initial_value`.
    pub fn new(initial_value: u64) -> Arc<Self> {
        Arc::new(Self {
            id: SemaphoreId::next(),
            state: Mutex::new(SemaphoreState {
                current_value: initial_value,
                failure: None,
                timepoints: Vec::new(),
                next_timepoint: 0,
            }),
        })
    }

    /// Semaphore identifier.
    pub fn id(&self) -> SemaphoreId {
        self.id
    }

    /// Snapshot of the current value, or the failure the semaphore was
    /// poisoned with.
    pub fn query(&self) -> Result<u64> {
        let state = self.state.lock();
        match &state.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(state.current_value),
        }
    }

    /// Whether the semaphore has been failed.
    pub fn is_failed(&self) -> bool {
        self.state.lock().failure.is_some()
    }

    /// Number of timepoints still waiting.
    pub fn pending_timepoints(&self) -> usize {
        self.state.lock().timepoints.len()
    }

    /// Advance the counter to `new_value` and notify every timepoint it
    /// reaches, each exactly once.
    ///
    /// Fails with [`HalError::NonMonotonicSignal`] unless `new_value` is
    /// strictly greater than the current value; the counter is then left
    /// unchanged. A poisoned semaphore returns its failure.
    pub fn signal(&self, new_value: u64) -> Result<()> {
        let reached = {
            let mut state = self.state.lock();
            if let Some(failure) = &state.failure {
                return Err(failure.clone());
            }
            if new_value <= state.current_value {
                return Err(HalError::NonMonotonicSignal {
                    semaphore_id: self.id,
                    current: state.current_value,
                    requested: new_value,
                });
            }
            state.current_value = new_value;
            let (reached, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.timepoints)
                .into_iter()
                .partition(|t| t.minimum_value <= new_value);
            state.timepoints = pending;
            reached
        };

        tracing::trace!(
            semaphore_id = %self.id,
            value = new_value,
            notified = reached.len(),
            "Semaphore signaled"
        );
        for timepoint in reached {
            timepoint.reached();
        }
        Ok(())
    }

    /// Poison the semaphore.
    ///
    /// Every pending timepoint is notified with the failure, and every later
    /// wait, enqueue, query or signal observes it. The first failure wins.
    pub fn fail(&self, error: HalError) {
        let (failure, timepoints) = {
            let mut state = self.state.lock();
            let failure = state.failure.get_or_insert(error).clone();
            (failure, std::mem::take(&mut state.timepoints))
        };

        tracing::debug!(
            semaphore_id = %self.id,
            error = %failure,
            notified = timepoints.len(),
            "Semaphore failed"
        );
        for timepoint in timepoints {
            timepoint.failed(&failure);
        }
    }

    /// Make `task` wait for the counter to reach `minimum_value`.
    ///
    /// If the value is already reached the dependency is released at once.
    /// Otherwise a timepoint record is allocated from `arena` (the arena of
    /// the task's fragment) and the task is released by the signal that
    /// reaches the value. Never blocks.
    ///
    /// A poisoned semaphore returns its failure and leaves the dependency
    /// untouched; the caller decides how to resolve it.
    pub fn enqueue_timepoint(
        &self,
        minimum_value: u64,
        task: TaskRef,
        arena: &mut Arena,
        submitter: &Submitter,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if let Some(failure) = &state.failure {
                return Err(failure.clone());
            }
            if state.current_value < minimum_value {
                let record = arena.write(&timepoint_record(self.id, minimum_value))?;
                state.push(
                    minimum_value,
                    Notify::Task {
                        task,
                        submitter: submitter.clone(),
                    },
                    Some(record),
                );
                return Ok(());
            }
        }
        task.release(submitter)
    }

    /// Park `gate` until the counter reaches `minimum_value`.
    ///
    /// `record` is the timepoint record the caller already allocated in the
    /// gated fragment's arena. Returns `Ok(None)` if the value is already
    /// reached (nothing was registered; the caller counts the gate down).
    pub(crate) fn enqueue_gate(
        &self,
        minimum_value: u64,
        gate: &Arc<WaitGate>,
        record: Option<ArenaPtr>,
    ) -> Result<Option<TimepointId>> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        if state.current_value >= minimum_value {
            return Ok(None);
        }
        let notify = Notify::Gate {
            gate: Arc::clone(gate),
        };
        Ok(Some(state.push(minimum_value, notify, record)))
    }

    /// Register a host waiter's event for `minimum_value`.
    ///
    /// Returns `Ok(None)` if the value is already reached (nothing was
    /// registered), or the timepoint to cancel once the wait is over.
    pub(crate) fn enqueue_event(
        &self,
        minimum_value: u64,
        event: &Event,
        token: EventToken,
    ) -> Result<Option<TimepointId>> {
        let mut state = self.state.lock();
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        if state.current_value >= minimum_value {
            return Ok(None);
        }
        let notify = Notify::Event {
            event: event.clone(),
            token,
        };
        Ok(Some(state.push(minimum_value, notify, None)))
    }

    /// Remove a timepoint that has not fired. No-op if it already fired.
    pub(crate) fn cancel_timepoint(&self, id: TimepointId) {
        let mut state = self.state.lock();
        state.timepoints.retain(|t| t.id != id);
    }
}

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        let timepoints = std::mem::take(&mut self.state.get_mut().timepoints);
        if timepoints.is_empty() {
            return;
        }
        tracing::warn!(
            semaphore_id = %self.id,
            pending = timepoints.len(),
            "Semaphore destroyed with pending timepoints"
        );
        let error = HalError::SemaphoreDestroyed {
            semaphore_id: self.id,
        };
        for timepoint in timepoints {
            timepoint.failed(&error);
        }
    }
}

impl std::fmt::Debug for TimelineSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TimelineSemaphore")
            .field("id", &self.id)
            .field("current_value", &state.current_value)
            .field("failed", &state.failure.is_some())
            .field("pending", &state.timepoints.len())
            .finish()
    }
}

pub(crate) fn timepoint_record(id: SemaphoreId, minimum_value: u64) -> [u8; TIMEPOINT_RECORD_SIZE] {
    let mut record = [0u8; TIMEPOINT_RECORD_SIZE];
    record[..8].copy_from_slice(&id.as_u64().to_le_bytes());
    record[8..].copy_from_slice(&minimum_value.to_le_bytes());
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{BarrierCall, Fragment, FragmentBuilder, TaskPayload};
    use taskhal_core::{BlockPool, EventPool, EventWait, QueueId};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn held_task(holds: usize) -> (Arc<Fragment>, TaskRef) {
        let pool = Arc::new(BlockPool::new(256, 4));
        let mut builder = FragmentBuilder::new(QueueId::new(0), Arena::new(pool));
        let root = builder.add(TaskPayload::Barrier(BarrierCall::Wait), &[]);
        builder.hold(root, holds);
        let fragment = builder.build();
        let task = TaskRef::new(Arc::clone(&fragment), root);
        (fragment, task)
    }

    fn drain(rx: &mut UnboundedReceiver<TaskRef>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[test]
    fn signal_must_increase() {
        let semaphore = TimelineSemaphore::new(5);
        let err = semaphore.signal(5).unwrap_err();
        assert!(matches!(
            err,
            HalError::NonMonotonicSignal {
                current: 5,
                requested: 5,
                ..
            }
        ));
        assert!(semaphore.signal(3).is_err());
        assert_eq!(semaphore.query().unwrap(), 5);

        semaphore.signal(6).unwrap();
        assert_eq!(semaphore.query().unwrap(), 6);
    }

    #[test]
    fn reached_value_releases_immediately() {
        let semaphore = TimelineSemaphore::new(3);
        let (fragment, task) = held_task(1);
        let (submitter, mut rx) = Submitter::channel();
        let mut arena = fragment.arena().write();
        semaphore
            .enqueue_timepoint(3, task, &mut arena, &submitter)
            .unwrap();
        assert_eq!(drain(&mut rx), 1);
        assert_eq!(semaphore.pending_timepoints(), 0);
        assert_eq!(arena.allocation_count(), 0);
    }

    #[test]
    fn timepoint_fires_once_when_reached() {
        let semaphore = TimelineSemaphore::new(0);
        let (fragment, task) = held_task(1);
        let (submitter, mut rx) = Submitter::channel();
        semaphore
            .enqueue_timepoint(2, task, &mut fragment.arena().write(), &submitter)
            .unwrap();
        assert_eq!(fragment.arena().read().allocation_count(), 1);

        semaphore.signal(1).unwrap();
        assert_eq!(drain(&mut rx), 0);
        semaphore.signal(2).unwrap();
        assert_eq!(drain(&mut rx), 1);
        semaphore.signal(3).unwrap();
        assert_eq!(drain(&mut rx), 0);
    }

    #[test]
    fn failure_poisons_waiters_and_later_calls() {
        let semaphore = TimelineSemaphore::new(0);
        let (fragment, task) = held_task(1);
        let (submitter, mut rx) = Submitter::channel();
        semaphore
            .enqueue_timepoint(1, task, &mut fragment.arena().write(), &submitter)
            .unwrap();

        semaphore.fail(HalError::internal("kernel fault"));
        semaphore.fail(HalError::internal("second"));
        assert_eq!(drain(&mut rx), 1);
        assert_eq!(fragment.failure(), Some(HalError::internal("kernel fault")));

        assert_eq!(semaphore.query(), Err(HalError::internal("kernel fault")));
        assert_eq!(semaphore.signal(9), Err(HalError::internal("kernel fault")));
        let (other, task) = held_task(1);
        let err = semaphore
            .enqueue_timepoint(1, task, &mut other.arena().write(), &submitter)
            .unwrap_err();
        assert_eq!(err, HalError::internal("kernel fault"));
    }

    #[test]
    fn cancelled_event_is_not_signaled() {
        let semaphore = TimelineSemaphore::new(0);
        let events = EventPool::new(1);
        let event = events.acquire().unwrap();
        let id = semaphore
            .enqueue_event(1, &event, event.token())
            .unwrap()
            .unwrap();
        semaphore.cancel_timepoint(id);
        semaphore.signal(1).unwrap();
        assert_eq!(event.signaled_count(), 0);
        assert!(semaphore.enqueue_event(1, &event, event.token()).unwrap().is_none());
    }

    #[test]
    fn drop_fails_pending_waiters() {
        let semaphore = TimelineSemaphore::new(0);
        let id = semaphore.id();
        let events = EventPool::new(1);
        let event = events.acquire().unwrap();
        semaphore.enqueue_event(4, &event, event.token()).unwrap();
        drop(semaphore);
        assert_eq!(
            event.wait(1, taskhal_core::Deadline::Immediate),
            EventWait::Failed(HalError::SemaphoreDestroyed { semaphore_id: id })
        );
    }
}
