//! Log collectors for capturing and storing log events.

use super::event::{LogEvent, LogLevel};
use crate::types::{FragmentId, QueueId, SemaphoreId};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Maximum number of events to keep in the default buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

/// Trait for log event collectors.
pub trait LogCollector: Send + Sync {
    /// Collect a log event.
    fn collect(&self, event: LogEvent);

    /// Get the number of collected events.
    fn len(&self) -> usize;

    /// Check if the collector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe log collector with a bounded ring buffer.
///
/// When full, the oldest event is dropped.
pub struct BufferedCollector {
    buffer: RwLock<VecDeque<LogEvent>>,
    capacity: usize,
    next_id: AtomicU64,
    min_level: LogLevel,
}

impl BufferedCollector {
    /// Create a new collector with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            min_level: LogLevel::Trace,
        }
    }

    /// Create a collector with default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }

    /// Drop incoming events below `level`.
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    fn select(&self, predicate: impl Fn(&LogEvent) -> bool) -> Vec<LogEvent> {
        self.buffer
            .read()
            .iter()
            .filter(|e| predicate(e))
            .cloned()
            .collect()
    }

    /// Get events for a specific fragment.
    pub fn by_fragment(&self, fragment_id: FragmentId) -> Vec<LogEvent> {
        self.select(|e| e.fragment_id == Some(fragment_id))
    }

    /// Get events for a specific queue.
    pub fn by_queue(&self, queue_id: QueueId) -> Vec<LogEvent> {
        self.select(|e| e.queue_id == Some(queue_id))
    }

    /// Get events concerning a specific semaphore.
    pub fn by_semaphore(&self, semaphore_id: SemaphoreId) -> Vec<LogEvent> {
        self.select(|e| e.semaphore_id == Some(semaphore_id))
    }

    /// Get events at or above a certain level.
    pub fn by_level(&self, min_level: LogLevel) -> Vec<LogEvent> {
        self.select(|e| e.level >= min_level)
    }

    /// Get all buffered events, oldest first.
    pub fn all(&self) -> Vec<LogEvent> {
        self.buffer.read().iter().cloned().collect()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.buffer.write().clear();
    }

    /// Get buffer capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl LogCollector for BufferedCollector {
    fn collect(&self, mut event: LogEvent) {
        if event.level < self.min_level {
            return;
        }
        event.id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let mut buffer = self.buffer.write();
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(event);
    }

    fn len(&self) -> usize {
        self.buffer.read().len()
    }
}

impl Default for BufferedCollector {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl std::fmt::Debug for BufferedCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferedCollector")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
