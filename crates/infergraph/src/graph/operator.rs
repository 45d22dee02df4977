//! Operator nodes: computation headers wired to tensors and peer operators.

use std::collections::BTreeSet;
use std::fmt;

use crate::ops::OpKind;

use super::join;
use super::tensor::TensorId;

/// Per-object identity of an operator inside one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A computation node: the tagged kind plus its graph wiring.
///
/// `predecessors`/`successors` are derived from the input/output tensor
/// edges and kept alongside them for O(1) traversal; ordered sets keep the
/// debug dump deterministic.
#[derive(Debug, Clone)]
pub struct OperatorNode {
    guid: OpId,
    kind: OpKind,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
    predecessors: BTreeSet<OpId>,
    successors: BTreeSet<OpId>,
}

impl OperatorNode {
    pub(crate) fn new(
        guid: OpId,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> Self {
        OperatorNode {
            guid,
            kind,
            inputs,
            outputs,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
        }
    }

    pub fn guid(&self) -> OpId {
        self.guid
    }

    pub fn op_kind(&self) -> &OpKind {
        &self.kind
    }

    pub(crate) fn op_kind_mut(&mut self) -> &mut OpKind {
        &mut self.kind
    }

    /// Input tensors in positional order.
    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    /// Output tensors in positional order.
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn predecessors(&self) -> &BTreeSet<OpId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<OpId> {
        &self.successors
    }

    pub(crate) fn predecessors_mut(&mut self) -> &mut BTreeSet<OpId> {
        &mut self.predecessors
    }

    pub(crate) fn successors_mut(&mut self) -> &mut BTreeSet<OpId> {
        &mut self.successors
    }

    /// Substitutes every occurrence of `old` among the inputs.
    ///
    /// The caller repairs the affected tensors' consumer lists and the
    /// derived predecessor/successor edges.
    pub(crate) fn replace_input(&mut self, old: TensorId, new: TensorId) {
        for input in &mut self.inputs {
            if *input == old {
                *input = new;
            }
        }
    }

    fn describe(&self) -> String {
        match &self.kind {
            OpKind::Concat(spec) => format!(
                "Concat[{}](dim={},inputs=[{}],output={})",
                self.guid,
                spec.dim,
                join(self.inputs.iter()),
                self.outputs[0],
            ),
            OpKind::MatMul(spec) => format!(
                "Matmul([{},{}],A={},B={},C={},mnk=[{}, {}, {}])",
                if spec.trans_a { "A^T" } else { "A" },
                if spec.trans_b { "B^T" } else { "B" },
                self.inputs[0],
                self.inputs[1],
                self.outputs[0],
                spec.m,
                spec.n,
                spec.k,
            ),
            OpKind::Transpose(spec) => format!(
                "Transpose[{}](input={},output={},perm={:?})",
                self.guid, self.inputs[0], self.outputs[0], spec.perm,
            ),
            OpKind::Relu => format!(
                "Relu[{}](input={},output={})",
                self.guid, self.inputs[0], self.outputs[0],
            ),
        }
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OP {}, pred [{}], succ [{}], {}",
            self.guid,
            join(self.predecessors.iter()),
            join(self.successors.iter()),
            self.describe(),
        )
    }
}
