//! Strongly-typed identifiers for taskhal entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEMAPHORE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_FRAGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier for a timeline semaphore.
///
/// Used as the key of per-queue state, so it must stay unique for the
/// lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SemaphoreId(u64);

impl SemaphoreId {
    /// Create a semaphore ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate the next unused semaphore ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SEMAPHORE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SemaphoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "semaphore_{}", self.0)
    }
}

/// Identifier for a task-graph fragment (one queue submission).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FragmentId(u64);

impl FragmentId {
    /// Create a fragment ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocate the next unused fragment ID.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_FRAGMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fragment_{}", self.0)
    }
}

/// Identifier for a queue on a device. Queue IDs are the queue's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueId(u32);

impl QueueId {
    /// Create a queue ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue_{}", self.0)
    }
}

impl From<u32> for QueueId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = SemaphoreId::next();
        let b = SemaphoreId::next();
        assert_ne!(a, b);

        let f1 = FragmentId::next();
        let f2 = FragmentId::next();
        assert!(f2 > f1);
    }

    #[test]
    fn id_display() {
        assert_eq!(SemaphoreId::new(4).to_string(), "semaphore_4");
        assert_eq!(FragmentId::new(9).to_string(), "fragment_9");
        assert_eq!(QueueId::from(1).to_string(), "queue_1");
    }
}
