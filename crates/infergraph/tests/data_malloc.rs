use std::sync::Arc;

use anyhow::Result;
use half::f16;

use infergraph::{CpuRuntime, DType, Graph, GraphError, Shape};

fn new_graph() -> Graph {
    Graph::new(Arc::new(CpuRuntime))
}

#[test]
fn data_malloc_binds_every_tensor() -> Result<()> {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([2, 3]), DType::F32);
    let w = graph.add_tensor(Shape::new([3, 4]), DType::F32);
    let matmul = graph.add_matmul(x, w, false, false)?;
    let out = graph.operator(matmul).outputs()[0];

    graph.shape_infer()?;
    graph.data_malloc()?;

    let mut intervals = Vec::new();
    for tensor in graph.tensors() {
        let blob = tensor.data().expect("every tensor is bound");
        assert_eq!(blob.len(), tensor.bytes());
        assert_eq!(blob.offset() % 8, 0);
        intervals.push((blob.offset(), blob.len()));
    }

    // Planned intervals must not overlap.
    intervals.sort();
    for pair in intervals.windows(2) {
        assert!(
            pair[0].0 + pair[0].1 <= pair[1].0,
            "blobs {pair:?} overlap"
        );
    }

    assert_eq!(graph.tensor(out).bytes(), 2 * 4 * 4);
    assert!(graph.allocator().is_frozen());
    assert_eq!(graph.allocator().peak(), 24 + 48 + 32);
    Ok(())
}

#[test]
fn raw_access_before_planning_is_rejected() {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    graph.add_relu(x).expect("consumer");

    let err = graph
        .tensor(x)
        .raw_data_ptr::<f32>()
        .expect_err("no blob yet");
    assert_eq!(err, GraphError::UnboundTensor(x));
}

#[test]
fn typed_access_enforces_the_dtype() -> Result<()> {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([2, 2]), DType::F32);
    graph.data_malloc()?;

    let err = graph
        .tensor(x)
        .raw_data_ptr::<i32>()
        .expect_err("i32 view of an f32 tensor");
    assert_eq!(
        err,
        GraphError::DTypeMismatch {
            expected: DType::F32,
            actual: DType::I32
        }
    );
    Ok(())
}

#[test]
fn host_round_trip_preserves_data() -> Result<()> {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([2, 3]), DType::F32);
    graph.data_malloc()?;

    let values = [1.0f32, -2.5, 3.25, 0.0, 5.0, -6.125];
    graph.tensor(x).copy_from_host(&values)?;
    assert_eq!(graph.tensor(x).as_host_slice::<f32>()?, &values);
    assert!(graph.tensor(x).equal_host_data(&values)?);
    Ok(())
}

#[test]
fn equal_data_applies_the_relative_tolerance() -> Result<()> {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([4]), DType::F32);
    let b = graph.add_tensor(Shape::new([4]), DType::F32);
    graph.data_malloc()?;

    graph
        .tensor(a)
        .copy_from_host(&[1.0f32, -2.0, 1000.0, 0.5])?;
    graph
        .tensor(b)
        .copy_from_host(&[1.0000001f32, -2.0000001, 1000.0005, 0.5])?;
    assert!(graph.tensor(a).equal_data(graph.tensor(b))?);

    graph
        .tensor(b)
        .copy_from_host(&[1.1f32, -2.0, 1000.0, 0.5])?;
    assert!(!graph.tensor(a).equal_data(graph.tensor(b))?);
    Ok(())
}

#[test]
fn equal_data_handles_zeros_absolutely() -> Result<()> {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([2]), DType::F32);
    let b = graph.add_tensor(Shape::new([2]), DType::F32);
    graph.data_malloc()?;

    graph.tensor(a).copy_from_host(&[0.0f32, 0.0])?;
    graph.tensor(b).copy_from_host(&[1e-7f32, -1e-7])?;
    assert!(
        graph.tensor(a).equal_data(graph.tensor(b))?,
        "near-zero differences compare absolutely"
    );

    graph.tensor(b).copy_from_host(&[1e-5f32, 0.0])?;
    assert!(!graph.tensor(a).equal_data(graph.tensor(b))?);
    Ok(())
}

#[test]
fn equal_data_distinguishes_size_and_dtype_mismatches() -> Result<()> {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([2]), DType::F32);
    let b = graph.add_tensor(Shape::new([3]), DType::F32);
    let c = graph.add_tensor(Shape::new([2]), DType::I32);
    graph.data_malloc()?;

    assert!(
        !graph.tensor(a).equal_data(graph.tensor(b))?,
        "different sizes simply compare unequal"
    );
    let err = graph
        .tensor(a)
        .equal_data(graph.tensor(c))
        .expect_err("dtypes must match");
    assert_eq!(
        err,
        GraphError::DTypeMismatch {
            expected: DType::F32,
            actual: DType::I32
        }
    );
    Ok(())
}

#[test]
fn integer_tensors_compare_exactly() -> Result<()> {
    let mut graph = new_graph();
    let a = graph.add_tensor(Shape::new([3]), DType::I32);
    let b = graph.add_tensor(Shape::new([3]), DType::I32);
    graph.data_malloc()?;

    graph.tensor(a).copy_from_host(&[1i32, -2, 3])?;
    graph.tensor(b).copy_from_host(&[1i32, -2, 3])?;
    assert!(graph.tensor(a).equal_data(graph.tensor(b))?);

    graph.tensor(b).copy_from_host(&[1i32, -2, 4])?;
    assert!(!graph.tensor(a).equal_data(graph.tensor(b))?);
    Ok(())
}

#[test]
fn half_precision_tensors_round_trip() -> Result<()> {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([4]), DType::F16);
    graph.data_malloc()?;
    assert_eq!(graph.tensor(x).bytes(), 8);

    let values: Vec<f16> = [0.5f32, -1.5, 2.0, 0.0]
        .iter()
        .map(|&v| f16::from_f32(v))
        .collect();
    graph.tensor(x).copy_from_host(&values)?;
    assert_eq!(graph.tensor(x).as_host_slice::<f16>()?, values.as_slice());
    assert!(graph.tensor(x).equal_host_data(&values)?);
    Ok(())
}

#[test]
fn planning_after_optimize_covers_surviving_tensors_only() -> Result<()> {
    let mut graph = new_graph();
    let x = graph.add_tensor(Shape::new([4, 3, 2]), DType::F32);
    let first = graph.add_transpose(x, vec![2, 1, 0])?;
    let mid = graph.operator(first).outputs()[0];
    let second = graph.add_transpose(mid, vec![2, 1, 0])?;
    let y = graph.operator(second).outputs()[0];
    let relu = graph.add_relu(y)?;
    let z = graph.operator(relu).outputs()[0];

    graph.shape_infer()?;
    graph.optimize();
    graph.data_malloc()?;

    assert_eq!(graph.tensor_count(), 2);
    for tensor in graph.tensors() {
        assert!(tensor.data().is_some());
    }
    // Two 24-element f32 tensors.
    assert_eq!(graph.allocator().peak(), 2 * 96);
    assert_eq!(graph.tensor(z).shape().dims(), &[4, 3, 2]);
    Ok(())
}
