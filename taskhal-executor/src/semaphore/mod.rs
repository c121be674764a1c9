//! Timeline semaphores.
//!
//! A [`TimelineSemaphore`] is a monotonically increasing 64-bit counter used
//! to order work across queues. Device work waits on it structurally, by
//! parking a task-graph node as a timepoint; only host code blocks, through
//! [`multi_wait`].
//!
//! A node waiting on several semaphores is parked behind one [`WaitGate`],
//! which opens on the last reached value or the first failure.
//!
//! A failed semaphore is poisoned: every later wait, enqueue and signal
//! observes the stored failure instead of hanging.

mod host_wait;
mod timeline;
mod wait_gate;

pub use host_wait::{SemaphoreList, WaitMode, multi_wait};
pub(crate) use timeline::timepoint_record;
pub use timeline::{TIMEPOINT_RECORD_SIZE, TimelineSemaphore, TimepointId};
pub use wait_gate::WaitGate;
