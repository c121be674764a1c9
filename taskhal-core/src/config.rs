//! Pool configuration.

use serde::{Deserialize, Serialize};

/// Default usable bytes per arena block: 32 KB.
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;

/// Smallest usable block size.
pub const MIN_BLOCK_SIZE: usize = 64;

/// Default maximum number of blocks the shared pool may hand out.
pub const DEFAULT_MAX_BLOCKS: usize = 1024;

/// Default number of events in the event pool.
pub const DEFAULT_EVENT_CAPACITY: usize = 32;

/// Configuration for the block pool and the event pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Usable bytes per arena block.
    pub block_size: usize,
    /// Maximum number of blocks loaned to arenas at once.
    pub max_blocks: usize,
    /// Fixed number of events in the event pool.
    pub event_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: DEFAULT_MAX_BLOCKS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PoolConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `TASKHAL_BLOCK_SIZE`: Usable bytes per arena block
    /// - `TASKHAL_MAX_BLOCKS`: Maximum blocks loaned at once
    /// - `TASKHAL_EVENT_POOL_CAPACITY`: Number of pooled events
    ///
    /// Missing, unparsable, zero or too small values fall back to the
    /// defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            block_size: env_usize("TASKHAL_BLOCK_SIZE")
                .filter(|&size| size >= MIN_BLOCK_SIZE)
                .unwrap_or(defaults.block_size),
            max_blocks: env_usize("TASKHAL_MAX_BLOCKS").unwrap_or(defaults.max_blocks),
            event_capacity: env_usize("TASKHAL_EVENT_POOL_CAPACITY")
                .unwrap_or(defaults.event_capacity),
        }
    }

    /// Small pools for tests.
    pub fn for_testing() -> Self {
        Self {
            block_size: 4 * 1024,
            max_blocks: 64,
            event_capacity: 8,
        }
    }

    /// Set the block size (at least [`MIN_BLOCK_SIZE`] bytes).
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(MIN_BLOCK_SIZE);
        self
    }

    /// Set the maximum number of loaned blocks (at least 1).
    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = max_blocks.max(1);
        self
    }

    /// Set the event pool capacity (at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Parse a positive `usize` from an environment variable.
pub fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
}
