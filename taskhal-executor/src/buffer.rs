//! Host-visible buffers and the byte ranges bound to commands.
//!
//! Buffers are shared, lock-protected byte slices. Kernels and transfer tasks
//! map a [`BufferBinding`] for reading or writing for as long as they touch
//! the memory; command ordering comes from the task graph, the lock only
//! keeps individual accesses memory-safe.

use parking_lot::{
    MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use taskhal_core::{HalError, Result};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A host-visible allocation.
///
/// Cloning a buffer clones the handle, not the memory.
#[derive(Clone)]
pub struct Buffer {
    id: u64,
    len: usize,
    data: Arc<RwLock<Box<[u8]>>>,
}

impl Buffer {
    /// Allocate a zero-filled buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_bytes(vec![0u8; size])
    }

    /// Wrap existing bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            len: bytes.len(),
            data: Arc::new(RwLock::new(bytes.into_boxed_slice())),
        }
    }

    /// Allocate a buffer holding `values` as little-endian words.
    pub fn from_u32s(values: &[u32]) -> Self {
        Self::from_bytes(values.iter().flat_map(|v| v.to_le_bytes()).collect())
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the contents out.
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().to_vec()
    }

    /// Copy the contents out as little-endian words. Trailing bytes are ignored.
    pub fn to_u32s(&self) -> Vec<u32> {
        bytes_to_u32s(&self.data.read())
    }

    /// Bind the whole buffer.
    pub fn bind(&self) -> BufferBinding {
        BufferBinding {
            buffer: self.clone(),
            offset: 0,
            length: self.len(),
        }
    }

    /// Bind `length` bytes starting at `offset`.
    pub fn bind_range(&self, offset: usize, length: usize) -> Result<BufferBinding> {
        BufferBinding::new(self.clone(), offset, length)
    }

    fn same_as(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.id)
            .field("len", &self.len())
            .finish()
    }
}

/// A byte range of a [`Buffer`] referenced by a command.
#[derive(Debug, Clone)]
pub struct BufferBinding {
    buffer: Buffer,
    offset: usize,
    length: usize,
}

impl BufferBinding {
    /// Bind a range, failing if it does not lie inside the buffer.
    pub fn new(buffer: Buffer, offset: usize, length: usize) -> Result<Self> {
        let size = buffer.len();
        let in_bounds = offset.checked_add(length).is_some_and(|end| end <= size);
        if !in_bounds {
            return Err(HalError::BufferRange {
                offset,
                length,
                size,
            });
        }
        Ok(Self {
            buffer,
            offset,
            length,
        })
    }

    /// The bound buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Start of the range in bytes.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Length of the range in bytes.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Whether the range is empty.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Map the range for reading.
    pub fn map_read(&self) -> MappedRwLockReadGuard<'_, [u8]> {
        let range = self.offset..self.offset + self.length;
        RwLockReadGuard::map(self.buffer.data.read(), |data| &data[range])
    }

    /// Map the range for writing.
    pub fn map_write(&self) -> MappedRwLockWriteGuard<'_, [u8]> {
        let range = self.offset..self.offset + self.length;
        RwLockWriteGuard::map(self.buffer.data.write(), |data| &mut data[range])
    }

    /// Read the `index`-th little-endian word of the range.
    pub fn load_u32(&self, index: usize) -> Option<u32> {
        let mapped = self.map_read();
        let bytes = mapped.get(index * 4..index * 4 + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Write the `index`-th little-endian word of the range.
    ///
    /// Returns false if the word lies outside the range.
    pub fn store_u32(&self, index: usize, value: u32) -> bool {
        let mut mapped = self.map_write();
        match mapped.get_mut(index * 4..index * 4 + 4) {
            Some(slot) => {
                slot.copy_from_slice(&value.to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Whether both bindings refer to the same buffer.
    pub fn aliases(&self, other: &BufferBinding) -> bool {
        self.buffer.same_as(&other.buffer)
    }

    /// Tile `pattern` over the range.
    pub(crate) fn fill(&self, pattern: &[u8]) {
        if pattern.is_empty() {
            return;
        }
        let mut mapped = self.map_write();
        for chunk in mapped.chunks_mut(pattern.len()) {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        }
    }

    /// Copy `source` into this range. Lengths must match.
    pub(crate) fn copy_from(&self, source: &BufferBinding) {
        let len = self.length.min(source.length);
        if self.aliases(source) {
            let mut data = self.buffer.data.write();
            data.copy_within(source.offset..source.offset + len, self.offset);
            return;
        }
        // Lock in buffer-id order so opposite copies cannot deadlock.
        if source.buffer.id < self.buffer.id {
            let src = source.map_read();
            let mut dst = self.map_write();
            dst[..len].copy_from_slice(&src[..len]);
        } else {
            let mut dst = self.map_write();
            let src = source.map_read();
            dst[..len].copy_from_slice(&src[..len]);
        }
    }
}

pub(crate) fn bytes_to_u32s(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
