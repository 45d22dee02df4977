//! Static memory planning: the pooled two-phase allocator and the backing
//! region/blob types tensors bind to after planning.

mod allocator;
mod region;

pub use allocator::PoolAllocator;
pub use region::{DataBlob, MemoryRegion};
