//! Concatenation along a single axis.

use crate::error::{GraphError, Result};
use crate::tensor::Shape;

/// State of a concat operator. `dim` is normalized against the first input's
/// rank when the operator is constructed, so it is always in `[0, rank)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatSpec {
    pub dim: usize,
}

impl ConcatSpec {
    /// Output shape: the first input's shape with axis `dim` replaced by the
    /// sum of every input's extent on that axis.
    ///
    /// All inputs must share the first input's rank and match it exactly on
    /// every non-`dim` axis.
    pub fn infer_shape(&self, inputs: &[Shape]) -> Result<Shape> {
        let first = &inputs[0];
        let rank = first.rank();
        let mut dims = first.dims().to_vec();
        for shape in &inputs[1..] {
            if shape.rank() != rank {
                return Err(GraphError::RankMismatch {
                    expected: rank,
                    actual: shape.rank(),
                });
            }
            for (axis, (&dim, &expected)) in shape.dims().iter().zip(first.dims()).enumerate() {
                if axis == self.dim {
                    dims[axis] += dim;
                } else if dim != expected {
                    return Err(GraphError::ShapeIncompatible {
                        lhs: first.dims().to_vec(),
                        rhs: shape.dims().to_vec(),
                    });
                }
            }
        }
        Ok(Shape::new(dims))
    }
}
