//! Materialized backing memory and the offset views tensors hold into it.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::runtime::Runtime;

/// A single device allocation owned by the allocator after materialization.
///
/// Every tensor blob in a planned graph is an offset view into one region;
/// the region returns its memory to the runtime when the last reference
/// drops, so blobs never outlive their backing block.
pub struct MemoryRegion {
    ptr: NonNull<u8>,
    bytes: usize,
    runtime: Arc<dyn Runtime>,
}

impl MemoryRegion {
    pub(crate) fn new(ptr: NonNull<u8>, bytes: usize, runtime: Arc<dyn Runtime>) -> Self {
        MemoryRegion {
            ptr,
            bytes,
            runtime,
        }
    }

    /// Base address of the region.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Total size of the region in bytes.
    pub fn len(&self) -> usize {
        self.bytes
    }

    /// Returns `true` for the degenerate zero-byte region.
    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr came from this runtime's alloc with the same size and
        // no blob can outlive the region that backs it.
        unsafe { self.runtime.dealloc(self.ptr, self.bytes) };
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("ptr", &self.ptr)
            .field("bytes", &self.bytes)
            .field("device", &self.runtime.device())
            .finish()
    }
}

/// An offset view into a [`MemoryRegion`], bound to a tensor after planning.
///
/// Blobs over the same region cover pairwise-disjoint byte ranges by
/// construction; the planner hands each tensor its own interval.
#[derive(Debug, Clone)]
pub struct DataBlob {
    region: Arc<MemoryRegion>,
    offset: usize,
    len: usize,
}

impl DataBlob {
    pub(crate) fn new(region: Arc<MemoryRegion>, offset: usize, len: usize) -> Self {
        debug_assert!(offset + len <= region.len() || region.is_empty());
        DataBlob {
            region,
            offset,
            len,
        }
    }

    /// Address of the first byte of this blob.
    pub fn as_ptr(&self) -> *mut u8 {
        // SAFETY: offset stays within the region by construction.
        unsafe { self.region.as_ptr().add(self.offset) }
    }

    /// Byte offset of this blob inside its backing region.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Size of the blob in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when the blob covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
