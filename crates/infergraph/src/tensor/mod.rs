//! Shapes, element types, and the host-access trait shared by graph tensors.

pub mod dtype;
pub mod shape;
pub mod storage;

pub use dtype::DType;
pub use shape::Shape;
pub use storage::Element;
