//! Structured logging for queue submissions.
//!
//! Every event can carry the queue, fragment and semaphore it concerns, so a
//! failed submission can be reconstructed from the collector after the fact:
//!
//! ```text
//! ┌─────────────┐     ┌────────────────────┐     ┌─────────────────┐
//! │ LogEvent    │────>│ LogCollector       │────>│ by_fragment()   │
//! │ (with IDs)  │     │ (bounded buffer)   │     │ by_queue() ...  │
//! └─────────────┘     └────────────────────┘     └─────────────────┘
//! ```
//!
//! These events complement `tracing`: tracing goes to the process subscriber,
//! while the collector keeps a queryable in-memory history per device.

mod collector;
mod event;

pub use collector::{BufferedCollector, DEFAULT_BUFFER_CAPACITY, LogCollector};
pub use event::{LogCategory, LogEvent, LogLevel};
