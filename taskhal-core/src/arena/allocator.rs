//! Bump allocator over pooled blocks.

use super::block_pool::{Block, BlockPool};
use crate::error::{HalError, Result};
use std::sync::Arc;

/// Alignment of every arena allocation.
pub const ARENA_ALIGNMENT: usize = 8;

/// A handle to bytes allocated from an [`Arena`].
///
/// The handle records the arena generation it was allocated in; resolving it
/// after the arena was reset fails instead of aliasing reused memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaPtr {
    generation: u32,
    block: u32,
    offset: u32,
    len: u32,
}

impl ArenaPtr {
    /// Length of the allocation in bytes.
    pub const fn len(&self) -> usize {
        self.len as usize
    }

    /// Whether the allocation is empty.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Generation of the arena that produced this pointer.
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// A bump-allocated region whose allocations all share one lifetime.
///
/// Memory comes from a shared [`BlockPool`] one block at a time. Individual
/// allocations are never freed; [`Arena::reset`] hands every block back to the
/// pool at once (O(blocks), not O(allocations)). Dropping the arena resets it.
pub struct Arena {
    pool: Arc<BlockPool>,
    blocks: Vec<Block>,
    /// Bump offset inside the last block.
    head: usize,
    generation: u32,
    bytes_allocated: usize,
    allocation_count: usize,
}

impl Arena {
    /// Create an empty arena. No block is taken until the first allocation.
    pub fn new(pool: Arc<BlockPool>) -> Self {
        Self {
            pool,
            blocks: Vec::new(),
            head: 0,
            generation: 0,
            bytes_allocated: 0,
            allocation_count: 0,
        }
    }

    /// Allocate `size` zeroed-or-stale bytes aligned to [`ARENA_ALIGNMENT`].
    ///
    /// Fails with [`HalError::BlockPoolExhausted`] when a new block is needed
    /// and the pool is dry; the arena is left unchanged and the call may be
    /// retried after another arena is reset.
    pub fn allocate(&mut self, size: usize) -> Result<ArenaPtr> {
        let block_size = self.pool.block_size();
        if size > block_size {
            return Err(HalError::ArenaAllocationTooLarge {
                requested: size,
                block_size,
            });
        }

        let aligned = align_up(self.head, ARENA_ALIGNMENT);
        let fits = !self.blocks.is_empty() && aligned + size <= block_size;
        let offset = if fits {
            aligned
        } else {
            let block = self.pool.acquire()?;
            self.blocks.push(block);
            0
        };

        self.head = offset + size;
        self.bytes_allocated += size;
        self.allocation_count += 1;

        Ok(ArenaPtr {
            generation: self.generation,
            block: (self.blocks.len() - 1) as u32,
            offset: offset as u32,
            len: size as u32,
        })
    }

    /// Make sure the next `bytes` of allocations cannot fail for lack of a
    /// block.
    ///
    /// Takes a fresh block from the pool if the current one lacks room.
    pub fn reserve(&mut self, bytes: usize) -> Result<()> {
        let block_size = self.pool.block_size();
        if bytes > block_size {
            return Err(HalError::ArenaAllocationTooLarge {
                requested: bytes,
                block_size,
            });
        }
        let aligned = align_up(self.head, ARENA_ALIGNMENT);
        if !self.blocks.is_empty() && aligned + bytes <= block_size {
            return Ok(());
        }
        if bytes == 0 {
            return Ok(());
        }
        let block = self.pool.acquire()?;
        self.blocks.push(block);
        self.head = 0;
        Ok(())
    }

    /// Allocate and copy `bytes` into the arena.
    pub fn write(&mut self, bytes: &[u8]) -> Result<ArenaPtr> {
        let ptr = self.allocate(bytes.len())?;
        self.get_mut(ptr)?.copy_from_slice(bytes);
        Ok(ptr)
    }

    /// Allocate and store `values` as little-endian words.
    pub fn write_u32s(&mut self, values: &[u32]) -> Result<ArenaPtr> {
        let ptr = self.allocate(values.len() * 4)?;
        let dst = self.get_mut(ptr)?;
        for (chunk, value) in dst.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        Ok(ptr)
    }

    /// Read back words stored with [`Arena::write_u32s`].
    pub fn read_u32s(&self, ptr: ArenaPtr) -> Result<Vec<u32>> {
        let bytes = self.get(ptr)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Resolve a pointer to its bytes.
    pub fn get(&self, ptr: ArenaPtr) -> Result<&[u8]> {
        let (block, range) = self.resolve(ptr)?;
        Ok(&self.blocks[block].bytes()[range])
    }

    /// Resolve a pointer to its bytes for writing.
    pub fn get_mut(&mut self, ptr: ArenaPtr) -> Result<&mut [u8]> {
        let (block, range) = self.resolve(ptr)?;
        Ok(&mut self.blocks[block].bytes_mut()[range])
    }

    fn resolve(&self, ptr: ArenaPtr) -> Result<(usize, std::ops::Range<usize>)> {
        if ptr.generation != self.generation {
            return Err(HalError::ArenaStalePointer {
                pointer_generation: ptr.generation,
                arena_generation: self.generation,
            });
        }
        let block = ptr.block as usize;
        let start = ptr.offset as usize;
        let end = start + ptr.len as usize;
        let in_bounds = match self.blocks.get(block) {
            Some(b) if block + 1 == self.blocks.len() => end <= self.head && end <= b.len(),
            Some(b) => end <= b.len(),
            None => false,
        };
        if !in_bounds {
            return Err(HalError::ArenaInvalidPointer {
                block: ptr.block,
                offset: ptr.offset,
                len: ptr.len,
            });
        }
        Ok((block, start..end))
    }

    /// Return every block to the pool and invalidate all outstanding pointers.
    pub fn reset(&mut self) {
        for block in self.blocks.drain(..) {
            self.pool.release(block);
        }
        self.head = 0;
        self.bytes_allocated = 0;
        self.allocation_count = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Number of blocks currently owned.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Bytes handed out since the last reset (excluding padding).
    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Number of allocations since the last reset.
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Current generation; bumped by every reset.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The pool this arena draws from.
    pub fn pool(&self) -> &Arc<BlockPool> {
        &self.pool
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        self.reset();
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("blocks", &self.blocks.len())
            .field("generation", &self.generation)
            .field("bytes_allocated", &self.bytes_allocated)
            .finish()
    }
}

const fn align_up(value: usize, alignment: usize) -> usize {
    (value + alignment - 1) & !(alignment - 1)
}
