//! Peephole rewrites over the operator graph.
//!
//! Patterns match at a single root operator and edit the graph in place
//! through the arena's edge-surgery helpers. The driver applies the first
//! matching pattern and restarts its scan from the head of the operator
//! list, iterating to a fixed point; restarting keeps the rewrite order
//! deterministic at a worst-case quadratic cost.

use crate::ops::{composes_to_identity, swaps_last_two, OpKind};

use super::arena::Graph;
use super::operator::OpId;

/// A local, pattern-based graph transformation.
pub trait RewritePattern {
    fn name(&self) -> &'static str;

    /// Attempts to match at `root` and rewrite in place.
    ///
    /// Returns `true` only when the graph actually changed; a partial match
    /// whose guards fail must report `false` so the driver does not restart
    /// for nothing.
    fn match_and_rewrite(&self, graph: &mut Graph, root: OpId) -> bool;
}

/// Counters reported by a rewrite run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RewriteStats {
    /// Rewrites applied across all passes.
    pub applied: usize,
    /// Full scans over the operator list, including the final empty one.
    pub passes: usize,
}

/// Applies `patterns` greedily until a full scan finds no match.
pub fn apply_patterns_greedily(
    graph: &mut Graph,
    patterns: &[&dyn RewritePattern],
) -> RewriteStats {
    let mut stats = RewriteStats::default();
    loop {
        stats.passes += 1;
        let mut applied = false;
        let snapshot = graph.op_order.clone();
        'scan: for root in snapshot {
            // A previous rewrite in this pass may have erased the operator.
            if !graph.contains_op(root) {
                continue;
            }
            for pattern in patterns {
                if pattern.match_and_rewrite(graph, root) {
                    tracing::debug!(
                        pattern = pattern.name(),
                        op = root.0,
                        "applied graph rewrite"
                    );
                    stats.applied += 1;
                    applied = true;
                    break 'scan;
                }
            }
        }
        if !applied {
            return stats;
        }
    }
}

/// Cancels `Transpose(p1) -> Transpose(p2)` chains whose permutations
/// compose to the identity, splicing the original tensor directly into every
/// consumer of the second transpose.
///
/// The intermediate tensor must have exactly one consumer; a shared
/// intermediate is still needed elsewhere and the pair stays.
pub struct CancelInverseTransposes;

impl RewritePattern for CancelInverseTransposes {
    fn name(&self) -> &'static str {
        "cancel-inverse-transposes"
    }

    fn match_and_rewrite(&self, graph: &mut Graph, root: OpId) -> bool {
        let Some(second) = graph.ops.get(&root) else {
            return false;
        };
        let OpKind::Transpose(second_spec) = second.op_kind() else {
            return false;
        };
        let &[mid] = second.inputs() else {
            return false;
        };
        let out = second.outputs()[0];
        let Some(first_id) = graph.tensors[&mid].source() else {
            return false;
        };
        if first_id == root {
            return false;
        }
        let first = &graph.ops[&first_id];
        let OpKind::Transpose(first_spec) = first.op_kind() else {
            return false;
        };
        if !composes_to_identity(&first_spec.perm, &second_spec.perm) {
            return false;
        }
        if graph.tensors[&mid].targets().len() != 1 {
            return false;
        }
        let original = first.inputs()[0];

        graph.remove_operator(root);
        graph.remove_operator(first_id);
        graph.redirect_consumers(out, original);
        graph.remove_tensor(mid);
        graph.remove_tensor(out);
        true
    }
}

/// Absorbs a producer `Transpose` that swaps only the last two axes into a
/// matmul's `trans_a`/`trans_b` flag, reconnecting the matmul to the
/// transpose's input.
///
/// Checks the A side first, then B; one application handles one side and
/// the driver's restart picks up the other.
pub struct FoldTransposeIntoMatMul;

impl RewritePattern for FoldTransposeIntoMatMul {
    fn name(&self) -> &'static str {
        "fold-transpose-into-matmul"
    }

    fn match_and_rewrite(&self, graph: &mut Graph, root: OpId) -> bool {
        let Some(matmul) = graph.ops.get(&root) else {
            return false;
        };
        if !matches!(matmul.op_kind(), OpKind::MatMul(_)) {
            return false;
        }
        let &[a, b] = matmul.inputs() else {
            return false;
        };

        for (side, mid) in [(0usize, a), (1usize, b)] {
            let Some(transpose_id) = graph.tensors[&mid].source() else {
                continue;
            };
            let OpKind::Transpose(spec) = graph.ops[&transpose_id].op_kind() else {
                continue;
            };
            if !swaps_last_two(&spec.perm) {
                continue;
            }
            if graph.tensors[&mid].targets().len() != 1 {
                continue;
            }
            let replacement = graph.ops[&transpose_id].inputs()[0];

            let node = graph.ops.get_mut(&root).expect("operator id must be valid");
            let OpKind::MatMul(matmul_spec) = node.op_kind_mut() else {
                return false;
            };
            if side == 0 {
                matmul_spec.trans_a = !matmul_spec.trans_a;
            } else {
                matmul_spec.trans_b = !matmul_spec.trans_b;
            }
            node.replace_input(mid, replacement);
            graph
                .tensors
                .get_mut(&replacement)
                .expect("tensor id must be valid")
                .add_target(root);
            graph
                .tensors
                .get_mut(&mid)
                .expect("tensor id must be valid")
                .remove_target(root);
            graph.remove_operator(transpose_id);
            if let Some(pred) = graph.tensors[&replacement].source() {
                graph
                    .ops
                    .get_mut(&pred)
                    .expect("operator id must be valid")
                    .successors_mut()
                    .insert(root);
                graph
                    .ops
                    .get_mut(&root)
                    .expect("operator id must be valid")
                    .predecessors_mut()
                    .insert(pred);
            }
            graph.remove_tensor(mid);
            return true;
        }
        false
    }
}
