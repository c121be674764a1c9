//! Pool of reusable wait/signal events.
//!
//! Blocking host waits need something to park on. Instead of creating a
//! fresh OS object per wait, the device owns a fixed set of [`Event`]s and
//! loans them out through [`EventPool::acquire`]. Exhaustion is back-pressure
//! ([`HalError::EventPoolExhausted`]), not a fatal error.
//!
//! Every event carries a generation counter. Signals are tagged with the
//! [`EventToken`] taken when the waiter registered, so a late signal aimed at
//! a previous borrower is ignored once the event was reset and loaned again.

use crate::error::{HalError, Result};
use crate::types::Deadline;
use parking_lot::{Condvar, Mutex};
use std::ops::Deref;
use std::sync::Arc;

/// Generation tag identifying one loan of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventToken(u64);

/// Outcome of [`Event::wait`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventWait {
    /// The required number of signals arrived.
    Satisfied,
    /// A failure was delivered instead of a signal.
    Failed(HalError),
    /// The deadline passed first.
    TimedOut {
        /// Signals still missing.
        missing: usize,
    },
}

#[derive(Debug)]
struct EventState {
    generation: u64,
    signaled: usize,
    failure: Option<HalError>,
}

#[derive(Debug)]
struct EventInner {
    state: Mutex<EventState>,
    cond: Condvar,
}

/// A reusable counting wait/signal object.
#[derive(Debug, Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    fn new() -> Self {
        Self {
            inner: Arc::new(EventInner {
                state: Mutex::new(EventState {
                    generation: 0,
                    signaled: 0,
                    failure: None,
                }),
                cond: Condvar::new(),
            }),
        }
    }

    /// Token for the current loan. Signals must present it.
    pub fn token(&self) -> EventToken {
        EventToken(self.inner.state.lock().generation)
    }

    /// Count one signal. Returns false if the token is stale.
    pub fn set(&self, token: EventToken) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != token.0 {
            return false;
        }
        state.signaled += 1;
        self.inner.cond.notify_all();
        true
    }

    /// Deliver a failure. The first failure of a loan wins.
    pub fn fail(&self, token: EventToken, error: HalError) -> bool {
        let mut state = self.inner.state.lock();
        if state.generation != token.0 {
            return false;
        }
        if state.failure.is_none() {
            state.failure = Some(error);
        }
        self.inner.cond.notify_all();
        true
    }

    /// Number of signals received during the current loan.
    pub fn signaled_count(&self) -> usize {
        self.inner.state.lock().signaled
    }

    /// Block until `required` signals arrived, a failure was delivered, or
    /// `deadline` passed.
    pub fn wait(&self, required: usize, deadline: Deadline) -> EventWait {
        let mut state = self.inner.state.lock();
        loop {
            if let Some(failure) = &state.failure {
                return EventWait::Failed(failure.clone());
            }
            if state.signaled >= required {
                return EventWait::Satisfied;
            }
            match deadline.instant() {
                None => self.inner.cond.wait(&mut state),
                Some(instant) => {
                    if self.inner.cond.wait_until(&mut state, instant).timed_out() {
                        if let Some(failure) = &state.failure {
                            return EventWait::Failed(failure.clone());
                        }
                        if state.signaled >= required {
                            return EventWait::Satisfied;
                        }
                        return EventWait::TimedOut {
                            missing: required - state.signaled,
                        };
                    }
                }
            }
        }
    }

    /// Clear signaled state and start a new generation.
    fn reset(&self) {
        let mut state = self.inner.state.lock();
        state.generation = state.generation.wrapping_add(1);
        state.signaled = 0;
        state.failure = None;
    }

    fn same_as(&self, other: &Event) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Fixed-size pool of [`Event`]s.
#[derive(Debug)]
pub struct EventPool {
    capacity: usize,
    free: Mutex<Vec<Event>>,
    all: Vec<Event>,
}

impl EventPool {
    /// Create a pool with `capacity` pre-created events.
    pub fn new(capacity: usize) -> Arc<Self> {
        let all: Vec<Event> = (0..capacity).map(|_| Event::new()).collect();
        Arc::new(Self {
            capacity,
            free: Mutex::new(all.clone()),
            all,
        })
    }

    /// Loan an event to exactly one waiter.
    ///
    /// The returned guard releases the event when dropped.
    pub fn acquire(self: &Arc<Self>) -> Result<PooledEvent> {
        let event = self
            .free
            .lock()
            .pop()
            .ok_or(HalError::EventPoolExhausted {
                capacity: self.capacity,
            })?;
        Ok(PooledEvent {
            event: Some(event),
            pool: Arc::clone(self),
        })
    }

    /// Return a loaned event. Always succeeds, even when every other event
    /// of the pool is idle.
    pub fn release(&self, event: PooledEvent) {
        event.release();
    }

    /// Reset an event and make it available again. Events that do not belong
    /// to this pool, or that are already idle, are ignored.
    fn recycle(&self, event: Event) {
        if !self.all.iter().any(|e| e.same_as(&event)) {
            tracing::warn!("Ignoring release of an event from another pool");
            return;
        }
        let mut free = self.free.lock();
        if free.iter().any(|e| e.same_as(&event)) {
            return;
        }
        event.reset();
        free.push(event);
    }

    /// Fixed number of events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events ready to be loaned.
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Events currently loaned.
    pub fn loaned(&self) -> usize {
        self.capacity - self.available()
    }
}

/// An event on loan from an [`EventPool`], returned on drop.
#[derive(Debug)]
pub struct PooledEvent {
    event: Option<Event>,
    pool: Arc<EventPool>,
}

impl PooledEvent {
    /// Return the event to its pool now.
    pub fn release(mut self) {
        self.return_to_pool();
    }

    fn return_to_pool(&mut self) {
        if let Some(event) = self.event.take() {
            self.pool.recycle(event);
        }
    }
}

impl Deref for PooledEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        // Only `return_to_pool` clears the slot, and it consumes or drops self.
        self.event.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledEvent {
    fn drop(&mut self) {
        self.return_to_pool();
    }
}
