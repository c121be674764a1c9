//! Core types for taskhal.

mod deadline;
mod ids;

pub use deadline::Deadline;
pub use ids::{FragmentId, QueueId, SemaphoreId};
