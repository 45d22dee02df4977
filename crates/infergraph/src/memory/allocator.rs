//! Offset-arithmetic pool allocator with a coalescing free list.
//!
//! Planning is two-phase: `alloc`/`free` only move offsets around on paper,
//! and a single runtime allocation of `peak` bytes happens in
//! [`PoolAllocator::materialize`]. After materialization the planner is
//! frozen and further `alloc`/`free` calls fail.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::runtime::Runtime;

use super::region::MemoryRegion;

/// Default alignment: the size of the widest supported scalar type.
const DEFAULT_ALIGNMENT: usize = std::mem::size_of::<u64>();

/// Two-phase pooled allocator planning offsets into a single backing block.
pub struct PoolAllocator {
    runtime: Arc<dyn Runtime>,
    used: usize,
    peak: usize,
    alignment: usize,
    /// Free blocks keyed by starting offset, so first-fit scans and neighbor
    /// coalescing both walk the map in address order.
    free_blocks: BTreeMap<usize, usize>,
    region: Option<Arc<MemoryRegion>>,
}

impl PoolAllocator {
    /// Creates an empty planner allocating from the given runtime.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        PoolAllocator {
            runtime,
            used: 0,
            peak: 0,
            alignment: DEFAULT_ALIGNMENT,
            free_blocks: BTreeMap::new(),
            region: None,
        }
    }

    /// Plans a block of at least `size` bytes and returns its offset.
    ///
    /// First-fit over the free list in offset order; grows the tail when no
    /// free block is large enough. Fails with [`GraphError::AllocatorFrozen`]
    /// once backing memory has been materialized.
    pub fn alloc(&mut self, size: usize) -> Result<usize> {
        if self.region.is_some() {
            return Err(GraphError::AllocatorFrozen);
        }
        let aligned = self.aligned_size(size);
        self.used += aligned;

        let found = self
            .free_blocks
            .iter()
            .find(|(_, &block_size)| block_size >= aligned)
            .map(|(&offset, &block_size)| (offset, block_size));
        if let Some((offset, block_size)) = found {
            self.free_blocks.remove(&offset);
            let remainder = block_size - aligned;
            if remainder > 0 {
                self.free_blocks.insert(offset + aligned, remainder);
            }
            return Ok(offset);
        }

        let offset = self.peak;
        self.peak += aligned;
        Ok(offset)
    }

    /// Returns a planned block to the free list, merging with adjacent free
    /// neighbors and reclaiming the tail when the merged block ends at `peak`.
    pub fn free(&mut self, offset: usize, size: usize) -> Result<()> {
        if self.region.is_some() {
            return Err(GraphError::AllocatorFrozen);
        }
        let aligned = self.aligned_size(size);
        self.used -= aligned;

        let mut offset = offset;
        let mut size = aligned;

        // Right neighbor starts exactly where this block ends.
        if let Some(&next_size) = self.free_blocks.get(&(offset + size)) {
            self.free_blocks.remove(&(offset + size));
            size += next_size;
        }
        // Left neighbor ends exactly where this block starts.
        if let Some((&prev_offset, &prev_size)) = self.free_blocks.range(..offset).next_back() {
            if prev_offset + prev_size == offset {
                self.free_blocks.remove(&prev_offset);
                offset = prev_offset;
                size += prev_size;
            }
        }

        if offset + size == self.peak {
            self.peak = offset;
        } else {
            self.free_blocks.insert(offset, size);
        }
        Ok(())
    }

    /// Performs the one real allocation: `peak` bytes from the runtime.
    ///
    /// Idempotent; every call after the first returns the same region. Once
    /// this has run, `alloc` and `free` are rejected.
    pub fn materialize(&mut self) -> Result<Arc<MemoryRegion>> {
        if let Some(region) = &self.region {
            return Ok(Arc::clone(region));
        }
        let ptr = self.runtime.alloc(self.peak)?;
        tracing::info!(
            bytes = self.peak,
            device = %self.runtime.device(),
            "pool allocator materialized backing memory"
        );
        let region = Arc::new(MemoryRegion::new(ptr, self.peak, Arc::clone(&self.runtime)));
        self.region = Some(Arc::clone(&region));
        Ok(region)
    }

    /// Bytes currently planned out (aligned).
    pub fn used(&self) -> usize {
        self.used
    }

    /// High-water mark of the plan; the size of the materialized block.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Returns `true` once backing memory exists and planning is over.
    pub fn is_frozen(&self) -> bool {
        self.region.is_some()
    }

    /// Number of blocks currently on the free list.
    pub fn free_block_count(&self) -> usize {
        self.free_blocks.len()
    }

    /// Reports current usage through the logging layer.
    pub fn info(&self) {
        tracing::info!(
            used = self.used,
            peak = self.peak,
            free_blocks = self.free_blocks.len(),
            "pool allocator usage"
        );
    }

    fn aligned_size(&self, size: usize) -> usize {
        if size == 0 {
            return 0;
        }
        ((size - 1) / self.alignment + 1) * self.alignment
    }
}
