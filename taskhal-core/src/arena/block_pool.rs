//! Shared pool of fixed-size arena blocks.

use crate::config::PoolConfig;
use crate::error::{HalError, Result};
use parking_lot::Mutex;

/// A fixed-size chunk of memory loaned from a [`BlockPool`].
pub struct Block {
    data: Box<[u8]>,
}

impl Block {
    fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Usable bytes in the block.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block has no usable bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block").field("len", &self.len()).finish()
    }
}

#[derive(Debug)]
struct PoolState {
    /// Idle blocks ready for reuse.
    free: Vec<Block>,
    /// Blocks created so far, idle or loaned.
    allocated: usize,
}

/// Bounded pool of equally sized blocks shared by every arena of a device.
///
/// Blocks are created lazily up to `capacity` and recycled afterwards, so a
/// steady-state workload performs no heap allocation when issuing.
#[derive(Debug)]
pub struct BlockPool {
    block_size: usize,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl BlockPool {
    /// Create a pool handing out `capacity` blocks of `block_size` bytes.
    pub fn new(block_size: usize, capacity: usize) -> Self {
        Self {
            block_size,
            capacity,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                allocated: 0,
            }),
        }
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.block_size, config.max_blocks)
    }

    /// Loan one block.
    ///
    /// Fails with [`HalError::BlockPoolExhausted`] when every block is owned by
    /// a live arena; retry after an in-flight arena is reset.
    pub fn acquire(&self) -> Result<Block> {
        let mut state = self.state.lock();
        if let Some(block) = state.free.pop() {
            return Ok(block);
        }
        if state.allocated >= self.capacity {
            tracing::debug!(capacity = self.capacity, "Block pool exhausted");
            return Err(HalError::BlockPoolExhausted {
                in_use: state.allocated,
                capacity: self.capacity,
            });
        }
        state.allocated += 1;
        Ok(Block::new(self.block_size))
    }

    /// Return a block to the pool. Always succeeds.
    ///
    /// Blocks of a foreign size, or blocks that would overflow the pool, are
    /// dropped instead of recycled.
    pub fn release(&self, block: Block) {
        let mut state = self.state.lock();
        if block.len() != self.block_size || state.free.len() >= state.allocated {
            tracing::warn!(
                block_len = block.len(),
                block_size = self.block_size,
                "Dropping block that does not belong to this pool"
            );
            return;
        }
        state.free.push(block);
    }

    /// Release every idle block back to the system allocator.
    pub fn trim(&self) {
        let mut state = self.state.lock();
        let idle = state.free.len();
        state.free.clear();
        state.allocated -= idle;
    }

    /// Usable bytes per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Maximum number of blocks the pool may hand out.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of blocks currently loaned to arenas.
    pub fn in_use(&self) -> usize {
        let state = self.state.lock();
        state.allocated - state.free.len()
    }

    /// Number of idle blocks ready for reuse.
    pub fn idle(&self) -> usize {
        self.state.lock().free.len()
    }
}
