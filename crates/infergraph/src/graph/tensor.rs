//! Tensor nodes: shaped, typed values wired into the graph by id handles.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{GraphError, Result};
use crate::memory::DataBlob;
use crate::runtime::Device;
use crate::tensor::{DType, Element, Shape};

use super::operator::OpId;
use super::join;

/// Relative tolerance used by [`TensorNode::equal_data`].
pub const DEFAULT_REL_EPS: f64 = 1e-6;

/// Per-object identity of a tensor inside one graph. Doubles as the handle
/// every edge stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Functional unique id: stable across clones, fresh for tensors created
/// from scratch. The graph-level lookup key.
///
/// Drawn from a process-wide counter so a tensor imported into another graph
/// can never collide with that graph's own tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fuid(pub u32);

static FUID_COUNTER: AtomicU32 = AtomicU32::new(0);

impl Fuid {
    pub(crate) fn fresh() -> Fuid {
        Fuid(FUID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Fuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value node: shape, dtype, producer/consumer back-references, and the
/// data blob bound after memory planning.
///
/// Edges are id handles into the owning graph's arenas, so the producer and
/// consumer relations stay weak: a tensor can outlive its producer during a
/// rewrite, at which point `source` reads as `None`.
#[derive(Debug, Clone)]
pub struct TensorNode {
    guid: TensorId,
    fuid: Fuid,
    shape: Shape,
    dtype: DType,
    size: usize,
    device: Device,
    source: Option<OpId>,
    targets: Vec<OpId>,
    data: Option<DataBlob>,
}

impl TensorNode {
    pub(crate) fn new(
        guid: TensorId,
        fuid: Fuid,
        shape: Shape,
        dtype: DType,
        device: Device,
    ) -> Self {
        let size = shape.num_elements();
        TensorNode {
            guid,
            fuid,
            shape,
            dtype,
            size,
            device,
            source: None,
            targets: Vec::new(),
            data: None,
        }
    }

    pub fn guid(&self) -> TensorId {
        self.guid
    }

    pub fn fuid(&self) -> Fuid {
        self.fuid
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Cached element count, the product of the shape.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Total storage footprint in bytes.
    pub fn bytes(&self) -> usize {
        self.size * self.dtype.size_in_bytes()
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// The operator producing this tensor, if any.
    pub fn source(&self) -> Option<OpId> {
        self.source
    }

    /// The operators consuming this tensor. An operator appears once per
    /// input slot it occupies, so this is a multiset.
    pub fn targets(&self) -> &[OpId] {
        &self.targets
    }

    /// The data blob bound by memory planning, if planning has run.
    pub fn data(&self) -> Option<&DataBlob> {
        self.data.as_ref()
    }

    /// Typed pointer into the bound blob.
    pub fn raw_data_ptr<T: Element>(&self) -> Result<*mut T> {
        if T::DTYPE != self.dtype {
            return Err(GraphError::DTypeMismatch {
                expected: self.dtype,
                actual: T::DTYPE,
            });
        }
        let blob = self
            .data
            .as_ref()
            .ok_or(GraphError::UnboundTensor(self.guid))?;
        Ok(blob.as_ptr() as *mut T)
    }

    /// Borrows the bound data as a typed slice.
    pub fn as_host_slice<T: Element>(&self) -> Result<&[T]> {
        let ptr = self.raw_data_ptr::<T>()?;
        // SAFETY: the blob covers exactly `size` elements of T and lives as
        // long as this node's reference to the backing region.
        Ok(unsafe { std::slice::from_raw_parts(ptr as *const T, self.size) })
    }

    /// Copies host data into the bound blob.
    ///
    /// Panics if `src` does not hold exactly `size` elements.
    pub fn copy_from_host<T: Element>(&self, src: &[T]) -> Result<()> {
        let ptr = self.raw_data_ptr::<T>()?;
        assert_eq!(
            src.len(),
            self.size,
            "host buffer length must match the tensor element count"
        );
        // SAFETY: planned blobs cover pairwise-disjoint ranges, so writing
        // this tensor's interval cannot alias another tensor's data.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), ptr, src.len()) };
        Ok(())
    }

    /// Compares bound data element-wise with the default tolerance.
    pub fn equal_data(&self, other: &TensorNode) -> Result<bool> {
        self.equal_data_eps(other, DEFAULT_REL_EPS)
    }

    /// Compares bound data element-wise.
    ///
    /// Integral elements compare exactly. Floating elements compare with an
    /// absolute tolerance of `rel_eps` when either side is zero and a
    /// relative tolerance of `rel_eps` otherwise. Tensors of differing size
    /// compare unequal; differing dtypes are a caller error.
    pub fn equal_data_eps(&self, other: &TensorNode, rel_eps: f64) -> Result<bool> {
        if self.dtype != other.dtype {
            return Err(GraphError::DTypeMismatch {
                expected: self.dtype,
                actual: other.dtype,
            });
        }
        if self.size != other.size {
            return Ok(false);
        }
        match self.dtype {
            DType::I32 => Ok(self.as_host_slice::<i32>()? == other.as_host_slice::<i32>()?),
            DType::F32 => Ok(all_close(
                self.as_host_slice::<f32>()?,
                other.as_host_slice::<f32>()?,
                rel_eps,
            )),
            DType::F16 => Ok(all_close(
                self.as_host_slice::<half::f16>()?,
                other.as_host_slice::<half::f16>()?,
                rel_eps,
            )),
            DType::BF16 => Ok(all_close(
                self.as_host_slice::<half::bf16>()?,
                other.as_host_slice::<half::bf16>()?,
                rel_eps,
            )),
        }
    }

    /// Compares bound data against a host buffer, applying the same rules as
    /// [`TensorNode::equal_data`].
    pub fn equal_host_data<T: Element + PartialEq>(&self, expected: &[T]) -> Result<bool> {
        let actual = self.as_host_slice::<T>()?;
        if actual.len() != expected.len() {
            return Ok(false);
        }
        if T::DTYPE.is_float() {
            Ok(all_close(actual, expected, DEFAULT_REL_EPS))
        } else {
            Ok(actual == expected)
        }
    }

    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.size = shape.num_elements();
        self.shape = shape;
    }

    pub(crate) fn set_source(&mut self, source: Option<OpId>) {
        self.source = source;
    }

    pub(crate) fn add_target(&mut self, op: OpId) {
        self.targets.push(op);
    }

    /// Removes every occurrence of `op` from the consumer multiset.
    pub(crate) fn remove_target(&mut self, op: OpId) {
        self.targets.retain(|&target| target != op);
    }

    pub(crate) fn bind_data(&mut self, blob: DataBlob) {
        self.data = Some(blob);
    }
}

impl fmt::Display for TensorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor {}, fuid {}, {:?}{}",
            self.guid, self.fuid, self.dtype, self.shape
        )?;
        match self.source {
            Some(op) => write!(f, ", source {op}")?,
            None => write!(f, ", source none")?,
        }
        write!(f, ", targets [{}]", join(self.targets.iter()))
    }
}

fn all_close<T: Element>(a: &[T], b: &[T], rel_eps: f64) -> bool {
    a.iter()
        .zip(b)
        .all(|(&x, &y)| scalar_close(f64::from(x.to_f32()), f64::from(y.to_f32()), rel_eps))
}

fn scalar_close(a: f64, b: f64, rel_eps: f64) -> bool {
    let (abs_a, abs_b) = (a.abs(), b.abs());
    if abs_a.min(abs_b) == 0.0 {
        (a - b).abs() <= rel_eps
    } else {
        (a - b).abs() / abs_a.max(abs_b) <= rel_eps
    }
}
