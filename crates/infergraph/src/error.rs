//! Unified error type for graph construction, planning, and data access.

use thiserror::Error;

use crate::graph::TensorId;
use crate::runtime::Device;
use crate::tensor::DType;

/// Crate-wide result alias.
pub type Result<T, E = GraphError> = std::result::Result<T, E>;

/// Errors surfaced synchronously by graph operations.
///
/// None of these are retried internally; a failed call leaves the graph in an
/// observable state that must not be planned or executed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Axes of two shapes cannot be reconciled under broadcasting or
    /// operator-specific matching rules.
    #[error("shapes {lhs:?} and {rhs:?} cannot be reconciled")]
    ShapeIncompatible { lhs: Vec<usize>, rhs: Vec<usize> },

    /// An axis index fell outside `[-rank, rank - 1]`.
    #[error("axis {axis} is out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },

    /// Participating tensor ranks disagree.
    #[error("rank mismatch: expected {expected}, got {actual}")]
    RankMismatch { expected: usize, actual: usize },

    /// A transpose permutation is not a permutation of `0..rank`.
    #[error("{perm:?} is not a permutation of 0..{rank}")]
    InvalidPermutation { perm: Vec<usize>, rank: usize },

    /// A tensor was imported into a graph running on a different device.
    #[error("tensor lives on {tensor} but the graph runtime is {graph}")]
    RuntimeMismatch { tensor: Device, graph: Device },

    /// Topological sorting found a dependency cycle.
    #[error("dependency cycle detected: {remaining} operators cannot be scheduled")]
    CyclicGraph { remaining: usize },

    /// A structural invariant does not hold (dangling edge, duplicate fuid,
    /// orphan tensor, malformed operator signature).
    #[error("graph invariant violated: {0}")]
    InvariantViolation(String),

    /// `alloc`/`free` was called after the pool materialized its backing
    /// memory; the planning phase is over.
    #[error("allocator is frozen: backing memory has already been materialized")]
    AllocatorFrozen,

    /// Raw data access before `data_malloc` bound a blob to the tensor.
    #[error("tensor {0} has no data bound; run data_malloc first")]
    UnboundTensor(TensorId),

    /// The runtime could not provide backing memory.
    #[error("runtime failed to allocate {bytes} bytes on {device}")]
    AllocationFailed { bytes: usize, device: Device },

    /// Typed data access with an element type that does not match the
    /// tensor's dtype, or comparison across differing dtypes.
    #[error("dtype mismatch: expected {expected:?}, got {actual:?}")]
    DTypeMismatch { expected: DType, actual: DType },
}
