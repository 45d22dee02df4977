pub mod error;
pub mod graph;
pub mod memory;
pub mod ops;
pub mod runtime;
pub mod tensor;

pub use error::{GraphError, Result};
pub use graph::{Fuid, Graph, OpId, OperatorNode, TensorId, TensorNode};
pub use memory::{DataBlob, MemoryRegion, PoolAllocator};
pub use ops::OpKind;
pub use runtime::{CpuRuntime, Device, Runtime};
pub use tensor::{DType, Element, Shape};
