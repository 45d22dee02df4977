//! Axis permutation and the permutation predicates the rewriter matches on.

use crate::error::{GraphError, Result};
use crate::tensor::Shape;

/// State of a transpose operator: `out[i] = in[perm[i]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

impl TransposeSpec {
    /// Output shape: the input's axes reordered by `perm`.
    ///
    /// The permutation's length must equal the input rank; this can drift
    /// after construction if an upstream shape changes, so it is re-checked
    /// on every inference.
    pub fn infer_shape(&self, input: &Shape) -> Result<Shape> {
        if self.perm.len() != input.rank() {
            return Err(GraphError::RankMismatch {
                expected: self.perm.len(),
                actual: input.rank(),
            });
        }
        if !is_permutation(&self.perm) {
            return Err(GraphError::InvalidPermutation {
                perm: self.perm.clone(),
                rank: input.rank(),
            });
        }
        let dims = input.dims();
        let out: Vec<usize> = self.perm.iter().map(|&axis| dims[axis]).collect();
        Ok(Shape::new(out))
    }
}

/// Returns `true` when `perm` is a valid permutation of `0..perm.len()`.
pub fn is_permutation(perm: &[usize]) -> bool {
    let mut seen = vec![false; perm.len()];
    for &axis in perm {
        if axis >= perm.len() || seen[axis] {
            return false;
        }
        seen[axis] = true;
    }
    true
}

/// Returns `true` when `perm` keeps every axis in place.
pub fn is_identity_perm(perm: &[usize]) -> bool {
    perm.iter().copied().eq(0..perm.len())
}

/// Returns `true` when applying `first` then `second` restores the original
/// axis order, i.e. `second[first[i]] == i` for every `i`.
pub fn composes_to_identity(first: &[usize], second: &[usize]) -> bool {
    first.len() == second.len()
        && first
            .iter()
            .enumerate()
            .all(|(i, &axis)| second.get(axis) == Some(&i))
}

/// Returns `true` when `perm` swaps the last two axes and fixes every other
/// axis, which is the only permutation a matmul transpose flag can absorb.
pub fn swaps_last_two(perm: &[usize]) -> bool {
    let rank = perm.len();
    if rank < 2 {
        return false;
    }
    perm[rank - 1] == rank - 2 && perm[rank - 2] == rank - 1 && is_identity_perm(&perm[..rank - 2])
}
