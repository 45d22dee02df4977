//! Device facade: the only place real memory is requested and returned.
//!
//! The graph and its allocator plan in offsets; when planning finishes they
//! ask the runtime for a single backing block. Kernel execution lives behind
//! the same facade in a full engine and is out of scope here.

use std::alloc::Layout;
use std::fmt;
use std::ptr::NonNull;

use crate::error::{GraphError, Result};

/// Base alignment of every backing block handed out by [`CpuRuntime`].
/// Generous enough for SIMD loads over any supported element type.
const CPU_BASE_ALIGN: usize = 64;

/// Identifies where a tensor's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
        }
    }
}

/// Allocation facade injected into graphs and allocators.
pub trait Runtime {
    /// The device this runtime manages.
    fn device(&self) -> Device;

    /// Requests `bytes` of device memory. A zero-byte request succeeds
    /// without touching the underlying allocator.
    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>>;

    /// Returns a block previously obtained from [`Runtime::alloc`].
    ///
    /// # Safety
    ///
    /// `ptr` must have come from `alloc` on this runtime with the same
    /// `bytes`, and must not be used afterwards.
    unsafe fn dealloc(&self, ptr: NonNull<u8>, bytes: usize);
}

/// Host-memory runtime backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn alloc(&self, bytes: usize) -> Result<NonNull<u8>> {
        if bytes == 0 {
            return Ok(NonNull::dangling());
        }
        let layout = Layout::from_size_align(bytes, CPU_BASE_ALIGN).map_err(|_| {
            GraphError::AllocationFailed {
                bytes,
                device: Device::Cpu,
            }
        })?;
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or(GraphError::AllocationFailed {
            bytes,
            device: Device::Cpu,
        })
    }

    unsafe fn dealloc(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes == 0 {
            return;
        }
        let layout = Layout::from_size_align_unchecked(bytes, CPU_BASE_ALIGN);
        std::alloc::dealloc(ptr.as_ptr(), layout);
    }
}
