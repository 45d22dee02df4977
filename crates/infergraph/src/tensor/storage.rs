//! Defines the scalar element trait used for typed host access to tensor data.

use half::{bf16, f16};

use super::dtype::DType;

/// Trait connecting Rust scalar types to the graph's [`DType`] tags.
///
/// Implementations widen to `f32` so relative-error comparisons can run
/// generically over every floating layout.
pub trait Element: Copy + 'static {
    /// The dtype tag a tensor must carry for this element type to be valid.
    const DTYPE: DType;

    /// Converts the element into a 32-bit float for comparisons.
    fn to_f32(self) -> f32;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn to_f32(self) -> f32 {
        self
    }
}

impl Element for f16 {
    const DTYPE: DType = DType::F16;

    fn to_f32(self) -> f32 {
        f16::to_f32(self)
    }
}

impl Element for bf16 {
    const DTYPE: DType = DType::BF16;

    fn to_f32(self) -> f32 {
        bf16::to_f32(self)
    }
}

impl Element for i32 {
    const DTYPE: DType = DType::I32;

    fn to_f32(self) -> f32 {
        self as f32
    }
}
