//! The arena-owning graph and its core algorithms.
//!
//! Tensors and operators live in two id-keyed arenas with explicit order
//! vectors; every edge is a stable id handle, so mutation and deletion are
//! map operations and no reference cycles can form.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::error::{GraphError, Result};
use crate::memory::{DataBlob, PoolAllocator};
use crate::ops::{is_permutation, ConcatSpec, MatMulSpec, OpKind, TransposeSpec};
use crate::runtime::{Device, Runtime};
use crate::tensor::shape::normalize_axis;
use crate::tensor::{DType, Shape};

use super::operator::{OpId, OperatorNode};
use super::rewrite::{
    apply_patterns_greedily, CancelInverseTransposes, FoldTransposeIntoMatMul, RewritePattern,
    RewriteStats,
};
use super::tensor::{Fuid, TensorId, TensorNode};

/// A computation graph bound to one runtime, owning its tensors, operators,
/// and memory planner.
pub struct Graph {
    runtime: Arc<dyn Runtime>,
    pub(crate) tensors: HashMap<TensorId, TensorNode>,
    pub(crate) tensor_order: Vec<TensorId>,
    pub(crate) ops: HashMap<OpId, OperatorNode>,
    pub(crate) op_order: Vec<OpId>,
    allocator: PoolAllocator,
    sorted: bool,
    next_tensor: u32,
    next_op: u32,
}

impl Graph {
    /// Creates an empty graph planning against the given runtime.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        let allocator = PoolAllocator::new(Arc::clone(&runtime));
        Graph {
            runtime,
            tensors: HashMap::new(),
            tensor_order: Vec::new(),
            ops: HashMap::new(),
            op_order: Vec::new(),
            allocator,
            sorted: false,
            next_tensor: 0,
            next_op: 0,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn device(&self) -> Device {
        self.runtime.device()
    }

    /// The memory planner, for usage inspection.
    pub fn allocator(&self) -> &PoolAllocator {
        &self.allocator
    }

    /// Whether the operator list currently holds a valid topological order.
    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    // ---- construction -----------------------------------------------------

    /// Creates a tensor with a fresh fuid and inserts it.
    pub fn add_tensor(&mut self, shape: Shape, dtype: DType) -> TensorId {
        let guid = self.fresh_tensor_id();
        let node = TensorNode::new(guid, Fuid::fresh(), shape, dtype, self.runtime.device());
        self.tensor_order.push(guid);
        self.tensors.insert(guid, node);
        guid
    }

    /// Imports an existing tensor, preserving its fuid (the clone relation).
    ///
    /// The imported copy starts with no edges; any bound data travels with
    /// it. Fails with [`GraphError::RuntimeMismatch`] when the tensor lives
    /// on a different device than this graph.
    pub fn add_external_tensor(&mut self, tensor: &TensorNode) -> Result<TensorId> {
        if tensor.device() != self.runtime.device() {
            return Err(GraphError::RuntimeMismatch {
                tensor: tensor.device(),
                graph: self.runtime.device(),
            });
        }
        let guid = self.fresh_tensor_id();
        let mut node = TensorNode::new(
            guid,
            tensor.fuid(),
            tensor.shape().clone(),
            tensor.dtype(),
            tensor.device(),
        );
        if let Some(blob) = tensor.data() {
            node.bind_data(blob.clone());
        }
        self.tensor_order.push(guid);
        self.tensors.insert(guid, node);
        Ok(guid)
    }

    /// Concatenates `inputs` along `dim` (negative axes count from the
    /// back). The axis is normalized against the first input's rank here, at
    /// construction time.
    pub fn add_concat(&mut self, inputs: &[TensorId], dim: isize) -> Result<OpId> {
        assert!(!inputs.is_empty(), "concat requires at least one input");
        let rank = self.tensor(inputs[0]).rank();
        let dim = normalize_axis(dim, rank)?;
        self.add_op_with_fresh_output(OpKind::Concat(ConcatSpec { dim }), inputs.to_vec())
    }

    /// Multiplies `a @ b` with optional transposition of either operand's
    /// last two axes.
    pub fn add_matmul(
        &mut self,
        a: TensorId,
        b: TensorId,
        trans_a: bool,
        trans_b: bool,
    ) -> Result<OpId> {
        self.add_op_with_fresh_output(
            OpKind::MatMul(MatMulSpec::new(trans_a, trans_b)),
            vec![a, b],
        )
    }

    /// Permutes the axes of `input` by `perm`, which must be a permutation
    /// of `0..rank`.
    pub fn add_transpose(&mut self, input: TensorId, perm: Vec<usize>) -> Result<OpId> {
        let rank = self.tensor(input).rank();
        if perm.len() != rank || !is_permutation(&perm) {
            return Err(GraphError::InvalidPermutation { perm, rank });
        }
        self.add_op_with_fresh_output(OpKind::Transpose(TransposeSpec { perm }), vec![input])
    }

    /// Applies an elementwise rectifier to `input`.
    pub fn add_relu(&mut self, input: TensorId) -> Result<OpId> {
        self.add_op_with_fresh_output(OpKind::Relu, vec![input])
    }

    /// Adds an operator whose output tensors already exist in the graph.
    ///
    /// This is the escape hatch for stitching prebuilt tensors together
    /// (including deliberately cyclic graphs in tests); the typed factories
    /// above are the usual path.
    pub fn add_operator(
        &mut self,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> Result<OpId> {
        kind.check_signature(inputs.len(), outputs.len())?;
        for id in inputs.iter().chain(outputs.iter()) {
            if !self.tensors.contains_key(id) {
                return Err(GraphError::InvariantViolation(format!(
                    "unknown tensor {} referenced by new {} operator",
                    id,
                    kind.name()
                )));
            }
        }
        Ok(self.add_operator_and_connect(kind, inputs, outputs))
    }

    fn add_op_with_fresh_output(&mut self, mut kind: OpKind, inputs: Vec<TensorId>) -> Result<OpId> {
        let input_shapes: Vec<Shape> = inputs
            .iter()
            .map(|&id| self.tensor(id).shape().clone())
            .collect();
        let output_shapes = kind.infer_shapes(&input_shapes)?;
        let dtype = self.tensor(inputs[0]).dtype();
        let outputs: Vec<TensorId> = output_shapes
            .into_iter()
            .map(|shape| self.add_tensor(shape, dtype))
            .collect();
        Ok(self.add_operator_and_connect(kind, inputs, outputs))
    }

    /// Inserts the operator and repairs every incident edge:
    /// consumer lists of its inputs, source links of its outputs, and the
    /// derived predecessor/successor sets in both directions.
    fn add_operator_and_connect(
        &mut self,
        kind: OpKind,
        inputs: Vec<TensorId>,
        outputs: Vec<TensorId>,
    ) -> OpId {
        self.sorted = false;
        let guid = self.fresh_op_id();
        let node = OperatorNode::new(guid, kind, inputs, outputs);
        self.op_order.push(guid);
        self.ops.insert(guid, node);

        let inputs = self.ops[&guid].inputs().to_vec();
        for input in inputs {
            self.tensors
                .get_mut(&input)
                .expect("tensor id must be valid")
                .add_target(guid);
            if let Some(pred) = self.tensors[&input].source() {
                self.ops
                    .get_mut(&pred)
                    .expect("operator id must be valid")
                    .successors_mut()
                    .insert(guid);
                self.ops
                    .get_mut(&guid)
                    .expect("operator id must be valid")
                    .predecessors_mut()
                    .insert(pred);
            }
        }

        let outputs = self.ops[&guid].outputs().to_vec();
        for output in outputs {
            let registered_consumers = {
                let tensor = self
                    .tensors
                    .get_mut(&output)
                    .expect("tensor id must be valid");
                tensor.set_source(Some(guid));
                tensor.targets().to_vec()
            };
            // Consumers wired up before this producer existed.
            for succ in registered_consumers {
                self.ops
                    .get_mut(&succ)
                    .expect("operator id must be valid")
                    .predecessors_mut()
                    .insert(guid);
                self.ops
                    .get_mut(&guid)
                    .expect("operator id must be valid")
                    .successors_mut()
                    .insert(succ);
            }
        }
        guid
    }

    // ---- lookup -----------------------------------------------------------

    /// Borrows a tensor node. Panics on a stale or foreign id.
    pub fn tensor(&self, id: TensorId) -> &TensorNode {
        self.tensors.get(&id).expect("tensor id must be valid")
    }

    /// Borrows an operator node. Panics on a stale or foreign id.
    pub fn operator(&self, id: OpId) -> &OperatorNode {
        self.ops.get(&id).expect("operator id must be valid")
    }

    /// Looks a tensor up by its functional id.
    pub fn tensor_by_fuid(&self, fuid: Fuid) -> Option<&TensorNode> {
        self.tensor_order
            .iter()
            .map(|id| &self.tensors[id])
            .find(|tensor| tensor.fuid() == fuid)
    }

    pub fn contains_tensor(&self, id: TensorId) -> bool {
        self.tensors.contains_key(&id)
    }

    pub fn contains_op(&self, id: OpId) -> bool {
        self.ops.contains_key(&id)
    }

    /// Tensors in arena order.
    pub fn tensors(&self) -> impl Iterator<Item = &TensorNode> {
        self.tensor_order.iter().map(|id| &self.tensors[id])
    }

    /// Operators in current list order (topological once sorted).
    pub fn operators(&self) -> impl Iterator<Item = &OperatorNode> {
        self.op_order.iter().map(|id| &self.ops[id])
    }

    pub fn tensor_count(&self) -> usize {
        self.tensor_order.len()
    }

    pub fn op_count(&self) -> usize {
        self.op_order.len()
    }

    /// Graph inputs: tensors no member operator produces.
    pub fn inputs(&self) -> Vec<TensorId> {
        self.tensor_order
            .iter()
            .copied()
            .filter(|id| self.tensors[id].source().is_none())
            .collect()
    }

    /// Graph outputs: tensors no member operator consumes.
    pub fn outputs(&self) -> Vec<TensorId> {
        self.tensor_order
            .iter()
            .copied()
            .filter(|id| self.tensors[id].targets().is_empty())
            .collect()
    }

    // ---- algorithms -------------------------------------------------------

    /// Reorders the operator list so every operator appears after the
    /// producers of all its inputs.
    ///
    /// Repeatedly sweeps the list, moving over every operator whose inputs
    /// are all either graph inputs or outputs of already-placed operators;
    /// ties keep their current relative order, making the result
    /// deterministic. A sweep that places nothing means a dependency cycle.
    pub fn topo_sort(&mut self) -> Result<()> {
        if self.sorted {
            return Ok(());
        }
        let total = self.op_order.len();
        let mut order = Vec::with_capacity(total);
        let mut placed: HashSet<OpId> = HashSet::with_capacity(total);

        while order.len() < total {
            let mut modified = false;
            for &id in &self.op_order {
                if placed.contains(&id) {
                    continue;
                }
                let ready = self.ops[&id].inputs().iter().all(|input| {
                    match self.tensors[input].source() {
                        None => true,
                        Some(source) => placed.contains(&source),
                    }
                });
                if ready {
                    order.push(id);
                    placed.insert(id);
                    modified = true;
                }
            }
            if !modified {
                return Err(GraphError::CyclicGraph {
                    remaining: total - order.len(),
                });
            }
        }

        self.op_order = order;
        self.sorted = true;
        Ok(())
    }

    /// Propagates shapes forward through the graph in topological order.
    ///
    /// Each operator's outputs are overwritten with its inferred shapes when
    /// they differ; this is the only path that mutates a tensor's shape.
    /// Matmul operators refresh their cached `(m, n, k)` as a side effect.
    pub fn shape_infer(&mut self) -> Result<()> {
        self.topo_sort()?;
        for id in self.op_order.clone() {
            let input_shapes: Vec<Shape> = self.ops[&id]
                .inputs()
                .iter()
                .map(|input| self.tensors[input].shape().clone())
                .collect();
            let node = self.ops.get_mut(&id).expect("operator id must be valid");
            let inferred = node.op_kind_mut().infer_shapes(&input_shapes)?;
            let outputs = node.outputs().to_vec();
            debug_assert_eq!(inferred.len(), outputs.len());
            for (output, shape) in outputs.into_iter().zip(inferred) {
                let tensor = self
                    .tensors
                    .get_mut(&output)
                    .expect("tensor id must be valid");
                if *tensor.shape() != shape {
                    tensor.set_shape(shape);
                }
            }
        }
        Ok(())
    }

    /// Runs the peephole rewriter to a fixed point.
    ///
    /// Cancels inverse transpose pairs and folds last-two-axis transposes
    /// into matmul transpose flags. Rewrites only remove operators, so a
    /// previously established topological order stays valid.
    pub fn optimize(&mut self) -> RewriteStats {
        let patterns: [&dyn RewritePattern; 2] =
            [&CancelInverseTransposes, &FoldTransposeIntoMatMul];
        apply_patterns_greedily(self, &patterns)
    }

    /// Plans an offset for every tensor, materializes the pool once at peak
    /// size, and binds each tensor's data blob at `base + offset`.
    pub fn data_malloc(&mut self) -> Result<()> {
        self.topo_sort()?;

        let mut offsets: HashMap<Fuid, usize> = HashMap::with_capacity(self.tensor_order.len());
        for id in &self.tensor_order {
            let tensor = &self.tensors[id];
            let offset = self.allocator.alloc(tensor.bytes())?;
            offsets.insert(tensor.fuid(), offset);
        }

        let region = self.allocator.materialize()?;
        for id in &self.tensor_order {
            let tensor = self.tensors.get_mut(id).expect("tensor id must be valid");
            let offset = offsets[&tensor.fuid()];
            tensor.bind_data(DataBlob::new(Arc::clone(&region), offset, tensor.bytes()));
        }

        self.allocator.info();
        Ok(())
    }

    // ---- validation & debug ----------------------------------------------

    /// Model-checks the structural invariants: no orphan tensors, edges that
    /// reference members only and agree in both directions, unique fuids.
    pub fn check_valid(&self) -> Result<()> {
        for &tid in &self.tensor_order {
            let tensor = &self.tensors[&tid];
            if tensor.source().is_none() && tensor.targets().is_empty() {
                return Err(invariant(format!(
                    "tensor {tid} has neither a producer nor a consumer"
                )));
            }
            if let Some(source) = tensor.source() {
                let Some(op) = self.ops.get(&source) else {
                    return Err(invariant(format!(
                        "tensor {tid} names source {source} which is not in the graph"
                    )));
                };
                if !op.outputs().contains(&tid) {
                    return Err(invariant(format!(
                        "tensor {tid} names source {source} but is not among its outputs"
                    )));
                }
            }
            for &target in tensor.targets() {
                let Some(op) = self.ops.get(&target) else {
                    return Err(invariant(format!(
                        "tensor {tid} names target {target} which is not in the graph"
                    )));
                };
                if !op.inputs().contains(&tid) {
                    return Err(invariant(format!(
                        "tensor {tid} names target {target} but is not among its inputs"
                    )));
                }
            }
        }

        for &oid in &self.op_order {
            let op = &self.ops[&oid];
            for &input in op.inputs() {
                let Some(tensor) = self.tensors.get(&input) else {
                    return Err(invariant(format!(
                        "operator {oid} reads tensor {input} which is not in the graph"
                    )));
                };
                if !tensor.targets().contains(&oid) {
                    return Err(invariant(format!(
                        "input {input} of operator {oid} does not list it as a target"
                    )));
                }
                if let Some(pred) = tensor.source() {
                    if !op.predecessors().contains(&pred) {
                        return Err(invariant(format!(
                            "operator {oid} is missing predecessor {pred}"
                        )));
                    }
                    let Some(pred_op) = self.ops.get(&pred) else {
                        return Err(invariant(format!(
                            "tensor {input} names source {pred} which is not in the graph"
                        )));
                    };
                    if !pred_op.successors().contains(&oid) {
                        return Err(invariant(format!(
                            "operator {pred} is missing successor {oid}"
                        )));
                    }
                }
            }
            for &output in op.outputs() {
                let Some(tensor) = self.tensors.get(&output) else {
                    return Err(invariant(format!(
                        "operator {oid} writes tensor {output} which is not in the graph"
                    )));
                };
                if tensor.source() != Some(oid) {
                    return Err(invariant(format!(
                        "output {output} of operator {oid} does not name it as source"
                    )));
                }
            }
            for &pred in op.predecessors() {
                if !self.ops.contains_key(&pred) {
                    return Err(invariant(format!(
                        "operator {oid} names predecessor {pred} which is not in the graph"
                    )));
                }
            }
            for &succ in op.successors() {
                if !self.ops.contains_key(&succ) {
                    return Err(invariant(format!(
                        "operator {oid} names successor {succ} which is not in the graph"
                    )));
                }
            }
        }

        let mut fuids = HashSet::with_capacity(self.tensor_order.len());
        for &tid in &self.tensor_order {
            let fuid = self.tensors[&tid].fuid();
            if !fuids.insert(fuid) {
                return Err(invariant(format!(
                    "fuid {fuid} appears on more than one tensor"
                )));
            }
        }
        Ok(())
    }

    // ---- internal edge surgery (used by the rewriter) ---------------------

    /// Removes an operator, severing every incident edge first: consumer
    /// entries on its inputs, source links on its outputs, and both
    /// directions of the derived operator edges. Missing peers (already
    /// removed during the same rewrite) are skipped.
    pub(crate) fn remove_operator(&mut self, id: OpId) {
        let Some(node) = self.ops.remove(&id) else {
            return;
        };
        self.op_order.retain(|&op| op != id);
        for input in node.inputs() {
            if let Some(tensor) = self.tensors.get_mut(input) {
                tensor.remove_target(id);
            }
        }
        for output in node.outputs() {
            if let Some(tensor) = self.tensors.get_mut(output) {
                if tensor.source() == Some(id) {
                    tensor.set_source(None);
                }
            }
        }
        for pred in node.predecessors() {
            if let Some(op) = self.ops.get_mut(pred) {
                op.successors_mut().remove(&id);
            }
        }
        for succ in node.successors() {
            if let Some(op) = self.ops.get_mut(succ) {
                op.predecessors_mut().remove(&id);
            }
        }
    }

    /// Drops a tensor from the arena. Callers sever its edges first.
    pub(crate) fn remove_tensor(&mut self, id: TensorId) {
        self.tensors.remove(&id);
        self.tensor_order.retain(|&tensor| tensor != id);
    }

    /// Splices `to` into every consumer of `from`, repairing consumer lists
    /// and linking each consumer to `to`'s producer.
    pub(crate) fn redirect_consumers(&mut self, from: TensorId, to: TensorId) {
        if from == to {
            return;
        }
        let consumers = self.tensor(from).targets().to_vec();
        for consumer in consumers {
            self.ops
                .get_mut(&consumer)
                .expect("operator id must be valid")
                .replace_input(from, to);
            self.tensors
                .get_mut(&to)
                .expect("tensor id must be valid")
                .add_target(consumer);
            self.tensors
                .get_mut(&from)
                .expect("tensor id must be valid")
                .remove_target(consumer);
            if let Some(pred) = self.tensors[&to].source() {
                self.ops
                    .get_mut(&pred)
                    .expect("operator id must be valid")
                    .successors_mut()
                    .insert(consumer);
                self.ops
                    .get_mut(&consumer)
                    .expect("operator id must be valid")
                    .predecessors_mut()
                    .insert(pred);
            }
        }
    }

    fn fresh_tensor_id(&mut self) -> TensorId {
        let id = TensorId(self.next_tensor);
        self.next_tensor += 1;
        id
    }

    fn fresh_op_id(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Tensors:")?;
        for id in &self.tensor_order {
            writeln!(f, "{}", self.tensors[id])?;
        }
        writeln!(f, "Graph operators:")?;
        for id in &self.op_order {
            writeln!(f, "{}", self.ops[id])?;
        }
        Ok(())
    }
}

fn invariant(message: String) -> GraphError {
    GraphError::InvariantViolation(message)
}
