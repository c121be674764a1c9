//! Per-queue record of semaphore values already reached.
//!
//! Submissions on one queue retire in the order their waits allow, so once a
//! queue knows a semaphore reached `v`, later submissions on the same queue
//! that wait for `v` or less can skip registering a timepoint. This is only
//! an optimization: dropping an entry (or never recording one) costs an extra
//! timepoint, never correctness.

use dashmap::DashMap;
use taskhal_core::SemaphoreId;

/// Highest value known reached, per semaphore.
#[derive(Debug, Default)]
pub struct QueueState {
    reached: DashMap<SemaphoreId, u64>,
}

impl QueueState {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `semaphore` is known to have reached `value`.
    pub fn has_reached(&self, semaphore: SemaphoreId, value: u64) -> bool {
        self.reached
            .get(&semaphore)
            .is_some_and(|reached| *reached >= value)
    }

    /// Record that `semaphore` reached `value`. Never lowers a known value.
    pub fn record_reached(&self, semaphore: SemaphoreId, value: u64) {
        self.reached
            .entry(semaphore)
            .and_modify(|reached| *reached = (*reached).max(value))
            .or_insert(value);
    }

    /// Forget a semaphore, e.g. after it was failed.
    pub fn forget(&self, semaphore: SemaphoreId) {
        self.reached.remove(&semaphore);
    }

    /// Number of tracked semaphores.
    pub fn len(&self) -> usize {
        self.reached.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.reached.is_empty()
    }
}
