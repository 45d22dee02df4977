//! The computation graph: tensor and operator arenas, edge maintenance,
//! topological ordering, shape inference, peephole rewriting, and static
//! memory planning.

mod arena;
mod operator;
pub mod rewrite;
mod tensor;

pub use arena::Graph;
pub use operator::{OpId, OperatorNode};
pub use rewrite::{
    apply_patterns_greedily, CancelInverseTransposes, FoldTransposeIntoMatMul, RewritePattern,
    RewriteStats,
};
pub use tensor::{Fuid, TensorId, TensorNode};

/// Renders ids as a comma-separated list for debug dumps.
pub(crate) fn join<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
