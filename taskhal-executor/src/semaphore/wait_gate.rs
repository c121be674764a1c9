//! Joining the waits of one task-graph node.

use super::timeline::{TimelineSemaphore, TimepointId};
use crate::task::{Submitter, TaskRef};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use taskhal_core::{HalError, Result};

/// Parks one node on several semaphore timepoints.
///
/// The node carries a single hold for the whole gate. The gate opens, and
/// releases that hold, when the last wait is reached or as soon as one wait
/// fails. After a failure every timepoint still registered is cancelled, so
/// a wait that is never signaled cannot keep the node parked.
pub struct WaitGate {
    task: TaskRef,
    submitter: Submitter,
    remaining: AtomicUsize,
    open: AtomicBool,
    registered: Mutex<Vec<(Weak<TimelineSemaphore>, TimepointId)>>,
}

impl WaitGate {
    /// Gate `task` on `waits` timepoints.
    pub fn new(task: TaskRef, submitter: Submitter, waits: usize) -> Arc<Self> {
        Arc::new(Self {
            task,
            submitter,
            remaining: AtomicUsize::new(waits),
            open: AtomicBool::new(false),
            registered: Mutex::new(Vec::new()),
        })
    }

    /// Whether the gated node was released.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Waits not yet reached.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// One wait reached its value.
    pub(crate) fn reached(&self) -> Result<()> {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.open(),
            _ => Ok(()),
        }
    }

    /// One wait failed: poison the node's fragment and open at once.
    pub(crate) fn failed(&self, error: &HalError) -> Result<()> {
        self.task.fragment().fail(error.clone());
        let opened = self.open();
        let cancelled: Vec<_> = std::mem::take(&mut *self.registered.lock());
        for (semaphore, id) in cancelled {
            if let Some(semaphore) = semaphore.upgrade() {
                semaphore.cancel_timepoint(id);
            }
        }
        opened
    }

    /// Remember a registered timepoint so a failure can cancel it.
    pub(crate) fn track(&self, semaphore: &Arc<TimelineSemaphore>, id: TimepointId) {
        let mut registered = self.registered.lock();
        if self.is_open() {
            drop(registered);
            semaphore.cancel_timepoint(id);
            return;
        }
        registered.push((Arc::downgrade(semaphore), id));
    }

    fn open(&self) -> Result<()> {
        if self.open.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.task.clone().release(&self.submitter)
    }
}

impl std::fmt::Debug for WaitGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGate")
            .field("task", &self.task)
            .field("remaining", &self.remaining())
            .field("open", &self.is_open())
            .finish()
    }
}
