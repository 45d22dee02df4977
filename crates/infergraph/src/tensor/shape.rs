//! Tensor shapes plus the broadcasting and indexing helpers built on them.

use std::fmt;

use crate::error::{GraphError, Result};

/// Stores the logical dimensions of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    /// Constructs a new shape from the provided dimensions.
    ///
    /// Panics if `dims` is empty, ensuring every tensor has at least one axis.
    pub fn new<D: Into<Vec<usize>>>(dims: D) -> Self {
        let dims = dims.into();
        assert!(!dims.is_empty(), "shape must have at least one dimension");
        Shape { dims }
    }

    /// Borrow the raw dimension slice for downstream calculations.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Returns the rank (number of axes) of the shape.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Computes the total number of elements implied by the shape.
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.dims)
    }
}

/// Right-aligned two-way broadcast over raw dimension slices.
///
/// Missing leading axes are treated as 1. Aligned axes must either match or
/// have one side equal to 1; anything else fails with
/// [`GraphError::ShapeIncompatible`]. Operating on slices (rather than
/// [`Shape`]) lets callers broadcast the possibly-empty batch prefix of a
/// matmul operand.
pub fn broadcast_dims(a: &[usize], b: &[usize]) -> Result<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        out[rank - 1 - i] = if da == db {
            da
        } else if da == 1 {
            db
        } else if db == 1 {
            da
        } else {
            return Err(GraphError::ShapeIncompatible {
                lhs: a.to_vec(),
                rhs: b.to_vec(),
            });
        };
    }
    Ok(out)
}

/// Broadcasts two full shapes together.
pub fn broadcast(a: &Shape, b: &Shape) -> Result<Shape> {
    broadcast_dims(a.dims(), b.dims()).map(Shape::new)
}

/// Maps a possibly-negative axis into `[0, rank)`.
///
/// Accepts `axis` in `[-rank, rank - 1]`; negative values count from the
/// back, so `-1` names the last axis.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize> {
    let signed_rank = rank as isize;
    if axis < -signed_rank || axis > signed_rank - 1 {
        return Err(GraphError::AxisOutOfRange { axis, rank });
    }
    if axis < 0 {
        Ok((signed_rank + axis) as usize)
    } else {
        Ok(axis as usize)
    }
}

/// Builds row-major contiguous strides (rightmost axis has stride 1).
pub fn contiguous_strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = stride;
        stride *= dims[axis];
    }
    strides
}

/// Converts a multi-dimensional index into a linear offset.
///
/// Each coordinate is reduced modulo its axis extent, so an index drawn from
/// a broadcast output shape addresses the correct element of a smaller
/// operand.
pub fn linear_offset(index: &[usize], shape: &[usize], strides: &[usize]) -> usize {
    debug_assert_eq!(index.len(), shape.len());
    debug_assert_eq!(shape.len(), strides.len());
    index
        .iter()
        .zip(shape)
        .zip(strides)
        .map(|((&i, &dim), &stride)| (i % dim) * stride)
        .sum()
}

/// Converts a linear element position back into a multi-dimensional index
/// via rightmost-axis-first successive divmod.
pub fn unravel_index(mut n: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0usize; shape.len()];
    for axis in (0..shape.len()).rev() {
        index[axis] = n % shape[axis];
        n /= shape[axis];
    }
    index
}
