use std::sync::Arc;

use infergraph::{CpuRuntime, DType, Graph, GraphError, OpKind, Shape};

fn new_graph() -> Graph {
    Graph::new(Arc::new(CpuRuntime))
}

#[test]
fn construction_wires_bidirectional_edges() {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([4, 3]), DType::F32);
    let transpose = graph
        .add_transpose(x, vec![1, 0])
        .expect("transpose construction");
    let mid = graph.operator(transpose).outputs()[0];
    let relu = graph.add_relu(mid).expect("relu construction");
    let out = graph.operator(relu).outputs()[0];

    assert_eq!(graph.tensor(x).targets(), &[transpose]);
    assert_eq!(graph.tensor(x).source(), None);
    assert_eq!(graph.tensor(mid).source(), Some(transpose));
    assert_eq!(graph.tensor(mid).targets(), &[relu]);
    assert_eq!(graph.tensor(out).source(), Some(relu));
    assert!(graph.tensor(out).targets().is_empty());

    assert!(graph.operator(transpose).predecessors().is_empty());
    assert!(graph.operator(transpose).successors().contains(&relu));
    assert!(graph.operator(relu).predecessors().contains(&transpose));
    assert!(graph.operator(relu).successors().is_empty());

    graph.check_valid().expect("freshly built graph is valid");
}

#[test]
fn inputs_and_outputs_partition_boundary_tensors() {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([2, 3]), DType::F32);
    let b = graph.add_tensor(Shape::new([3, 5]), DType::F32);
    let matmul = graph.add_matmul(a, b, false, false).expect("matmul");
    let c = graph.operator(matmul).outputs()[0];

    assert_eq!(graph.inputs(), vec![a, b]);
    assert_eq!(graph.outputs(), vec![c]);
}

#[test]
fn fresh_tensors_get_unique_fuids() {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([2]), DType::F32);
    let b = graph.add_tensor(Shape::new([2]), DType::F32);
    assert_ne!(graph.tensor(a).fuid(), graph.tensor(b).fuid());
    assert_ne!(graph.tensor(a).guid(), graph.tensor(b).guid());
}

#[test]
fn imported_tensor_shares_fuid_with_its_origin() {
    let mut source_graph = new_graph();
    let original = source_graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let fuid = source_graph.tensor(original).fuid();

    let mut graph = new_graph();
    let imported = graph
        .add_external_tensor(source_graph.tensor(original))
        .expect("same-device import");
    assert_eq!(graph.tensor(imported).fuid(), fuid);
    assert_ne!(graph.tensor(imported).guid(), original);
    assert!(graph.tensor_by_fuid(fuid).is_some());
}

#[test]
fn duplicate_fuid_in_one_graph_fails_validation() {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let clone = graph.tensor(a).clone();
    let b = graph.add_external_tensor(&clone).expect("import");
    // Consume both so the orphan rule does not fire first.
    graph.add_relu(a).expect("relu a");
    graph.add_relu(b).expect("relu b");

    let err = graph.check_valid().expect_err("duplicate fuid");
    assert!(matches!(err, GraphError::InvariantViolation(_)));
}

#[test]
fn orphan_tensor_fails_validation() {
    let mut graph = new_graph();
    let used = graph.add_tensor(Shape::new([2]), DType::F32);
    graph.add_relu(used).expect("relu");
    let _orphan = graph.add_tensor(Shape::new([3]), DType::F32);

    let err = graph.check_valid().expect_err("orphan tensor");
    assert!(matches!(err, GraphError::InvariantViolation(_)));
}

#[test]
fn topo_sort_places_producers_before_consumers() {
    let mut graph = new_graph();
    // Wire the chain back to front through the explicit-outputs API so the
    // insertion order disagrees with the dependency order.
    let t1 = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let t2 = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let t3 = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let late = graph
        .add_operator(OpKind::Relu, vec![t2], vec![t3])
        .expect("downstream relu");
    let early = graph
        .add_operator(OpKind::Relu, vec![t1], vec![t2])
        .expect("upstream relu");

    assert!(!graph.is_sorted());
    graph.topo_sort().expect("acyclic graph sorts");
    assert!(graph.is_sorted());

    let order: Vec<_> = graph.operators().map(|op| op.guid()).collect();
    assert_eq!(order, vec![early, late]);

    // Every predecessor must appear before its consumer.
    for (index, op) in graph.operators().enumerate() {
        for pred in op.predecessors() {
            let pred_index = order.iter().position(|id| id == pred).expect("member");
            assert!(pred_index < index, "{pred} must precede {}", op.guid());
        }
    }
}

#[test]
fn topo_sort_detects_cycles() {
    let mut graph = new_graph();
    let t1 = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    let t2 = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    graph
        .add_operator(OpKind::Relu, vec![t1], vec![t2])
        .expect("forward edge");
    graph
        .add_operator(OpKind::Relu, vec![t2], vec![t1])
        .expect("back edge");

    let err = graph.topo_sort().expect_err("two-op cycle");
    assert_eq!(err, GraphError::CyclicGraph { remaining: 2 });
    assert!(!graph.is_sorted());
}

#[test]
fn topo_sort_is_idempotent() {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    graph.add_relu(x).expect("relu");
    graph.topo_sort().expect("first sort");
    graph.topo_sort().expect("second sort is a no-op");
}

#[test]
fn display_renders_tensors_then_operators() {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([4, 3, 2]), DType::F32);
    graph.add_transpose(x, vec![2, 1, 0]).expect("transpose");

    let rendered = graph.to_string();
    let tensors_at = rendered.find("Graph Tensors:").expect("tensor section");
    let ops_at = rendered.find("Graph operators:").expect("operator section");
    assert!(tensors_at < ops_at);
    assert!(rendered.contains("Transpose"));
    assert!(rendered.contains("perm=[2, 1, 0]"));
    assert!(rendered.contains("pred ["));
}

#[test]
fn add_operator_rejects_unknown_tensors_and_bad_arity() {
    let mut graph = new_graph();
    let t = graph.add_tensor(Shape::new([2, 2]), DType::F32);

    let err = graph
        .add_operator(OpKind::Relu, vec![t, t], vec![t])
        .expect_err("relu takes one input");
    assert!(matches!(err, GraphError::InvariantViolation(_)));

    let bogus = infergraph::TensorId(u32::MAX);
    let err = graph
        .add_operator(OpKind::Relu, vec![bogus], vec![t])
        .expect_err("unknown tensor id");
    assert!(matches!(err, GraphError::InvariantViolation(_)));
}
