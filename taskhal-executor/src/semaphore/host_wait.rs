//! Blocking host waits over several semaphores.

use super::timeline::{TimelineSemaphore, TimepointId};
use std::sync::Arc;
use taskhal_core::{Deadline, EventPool, EventWait, HalError, Result};

/// Whether a host wait needs one or every semaphore to reach its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Return when any listed semaphore reached its value.
    Any,
    /// Return when every listed semaphore reached its value.
    #[default]
    All,
}

impl WaitMode {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// Ordered `(semaphore, value)` pairs.
#[derive(Debug, Clone, Default)]
pub struct SemaphoreList {
    entries: Vec<(Arc<TimelineSemaphore>, u64)>,
}

impl SemaphoreList {
    /// Empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`push`](Self::push).
    pub fn with(mut self, semaphore: &Arc<TimelineSemaphore>, value: u64) -> Self {
        self.push(semaphore, value);
        self
    }

    /// Append a pair.
    pub fn push(&mut self, semaphore: &Arc<TimelineSemaphore>, value: u64) {
        self.entries.push((Arc::clone(semaphore), value));
    }

    /// Iterate the pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<TimelineSemaphore>, u64)> {
        self.entries.iter().map(|(semaphore, value)| (semaphore, *value))
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Arc<TimelineSemaphore>, u64)> for SemaphoreList {
    fn from_iter<I: IntoIterator<Item = (Arc<TimelineSemaphore>, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

enum Scan {
    Satisfied,
    Failed(HalError),
    Pending(usize),
}

/// Fast path: classify the list without registering anything.
fn scan(mode: WaitMode, semaphores: &SemaphoreList) -> Scan {
    let mut pending = 0;
    let mut failure = None;
    for (semaphore, value) in semaphores.iter() {
        match semaphore.query() {
            Ok(current) if current >= value => {
                if mode == WaitMode::Any {
                    return Scan::Satisfied;
                }
            }
            Ok(_) => pending += 1,
            Err(err) => {
                if mode == WaitMode::All {
                    return Scan::Failed(err);
                }
                failure.get_or_insert(err);
            }
        }
    }
    match (failure, pending) {
        (_, 0) if mode == WaitMode::All => Scan::Satisfied,
        // Any: nothing satisfied and something is poisoned.
        (Some(err), _) => Scan::Failed(err),
        (None, pending) => Scan::Pending(pending),
    }
}

/// Block the calling thread until `semaphores` satisfy `mode`, a semaphore
/// is failed, or `deadline` passes.
///
/// An empty list returns immediately. With [`Deadline::Immediate`] the call
/// only polls. Otherwise one event is loaned from `events`, registered as a
/// timepoint on every unsatisfied semaphore, waited on, and returned to the
/// pool with every registration cancelled, whatever the outcome.
pub fn multi_wait(
    mode: WaitMode,
    semaphores: &SemaphoreList,
    deadline: Deadline,
    events: &Arc<EventPool>,
) -> Result<()> {
    if semaphores.is_empty() {
        return Ok(());
    }

    let pending = match scan(mode, semaphores) {
        Scan::Satisfied => return Ok(()),
        Scan::Failed(err) => return Err(err),
        Scan::Pending(pending) => pending,
    };
    if deadline.is_expired() {
        return Err(HalError::DeadlineExceeded { pending });
    }

    let event = events.acquire()?;
    let token = event.token();
    let mut registered: Vec<(&Arc<TimelineSemaphore>, TimepointId)> = Vec::with_capacity(pending);
    let mut reached = false;

    let outcome = (|| -> Result<()> {
        for (semaphore, value) in semaphores.iter() {
            match semaphore.enqueue_event(value, &event, token)? {
                Some(id) => registered.push((semaphore, id)),
                None => reached = true,
            }
        }

        let required = match mode {
            WaitMode::Any if reached => return Ok(()),
            WaitMode::Any => 1,
            WaitMode::All => registered.len(),
        };
        if required == 0 {
            return Ok(());
        }
        match event.wait(required, deadline) {
            EventWait::Satisfied => Ok(()),
            EventWait::Failed(err) => Err(err),
            EventWait::TimedOut { missing } => Err(HalError::DeadlineExceeded { pending: missing }),
        }
    })();

    for (semaphore, id) in registered {
        semaphore.cancel_timepoint(id);
    }
    event.release();
    outcome
}
