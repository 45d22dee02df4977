//! Batched matrix multiply with transpose flags.

use crate::error::{GraphError, Result};
use crate::tensor::shape::broadcast_dims;
use crate::tensor::Shape;

/// State of a matmul operator.
///
/// `trans_a`/`trans_b` read the corresponding operand with its last two axes
/// swapped; the peephole rewriter toggles them when it absorbs an adjacent
/// transpose. `m`/`n`/`k` are problem sizes cached by the latest shape
/// inference (zero until inference runs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatMulSpec {
    pub trans_a: bool,
    pub trans_b: bool,
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

impl MatMulSpec {
    pub fn new(trans_a: bool, trans_b: bool) -> Self {
        MatMulSpec {
            trans_a,
            trans_b,
            m: 0,
            n: 0,
            k: 0,
        }
    }

    /// Output shape: broadcast batch prefix plus the `[m, n]` tail.
    ///
    /// Both operands must have rank at least 2, and the contraction extents
    /// must agree after applying the transpose flags.
    pub fn infer_shape(&mut self, a: &Shape, b: &Shape) -> Result<Shape> {
        let (rank_a, rank_b) = (a.rank(), b.rank());
        if rank_a < 2 {
            return Err(GraphError::RankMismatch {
                expected: 2,
                actual: rank_a,
            });
        }
        if rank_b < 2 {
            return Err(GraphError::RankMismatch {
                expected: 2,
                actual: rank_b,
            });
        }
        let dims_a = a.dims();
        let dims_b = b.dims();
        let (m, k_a) = if self.trans_a {
            (dims_a[rank_a - 1], dims_a[rank_a - 2])
        } else {
            (dims_a[rank_a - 2], dims_a[rank_a - 1])
        };
        let (k_b, n) = if self.trans_b {
            (dims_b[rank_b - 1], dims_b[rank_b - 2])
        } else {
            (dims_b[rank_b - 2], dims_b[rank_b - 1])
        };
        if k_a != k_b {
            return Err(GraphError::ShapeIncompatible {
                lhs: dims_a.to_vec(),
                rhs: dims_b.to_vec(),
            });
        }

        let mut out = broadcast_dims(&dims_a[..rank_a - 2], &dims_b[..rank_b - 2])?;
        out.push(m);
        out.push(n);

        self.m = m;
        self.n = n;
        self.k = k_a;
        Ok(Shape::new(out))
    }
}
