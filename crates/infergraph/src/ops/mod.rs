//! Tagged operator kinds and their shape-inference contracts.
//!
//! Operator polymorphism is a closed set, so kinds are a tagged enum with
//! per-kind spec structs rather than a trait-object hierarchy; the peephole
//! rewriter dispatches on the tag directly.

mod concat;
mod matmul;
mod transpose;

pub use concat::ConcatSpec;
pub use matmul::MatMulSpec;
pub use transpose::{
    composes_to_identity, is_identity_perm, is_permutation, swaps_last_two, TransposeSpec,
};

use crate::error::{GraphError, Result};
use crate::tensor::Shape;

/// The operation an operator node performs, with its kind-specific state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    Concat(ConcatSpec),
    MatMul(MatMulSpec),
    Transpose(TransposeSpec),
    Relu,
}

impl OpKind {
    /// Short kind name used in debug renderings.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Concat(_) => "Concat",
            OpKind::MatMul(_) => "Matmul",
            OpKind::Transpose(_) => "Transpose",
            OpKind::Relu => "Relu",
        }
    }

    /// Validates the input/output arity an operator of this kind must have.
    pub fn check_signature(&self, num_inputs: usize, num_outputs: usize) -> Result<()> {
        let (inputs_ok, expected_inputs) = match self {
            OpKind::Concat(_) => (num_inputs >= 1, "at least 1"),
            OpKind::MatMul(_) => (num_inputs == 2, "exactly 2"),
            OpKind::Transpose(_) | OpKind::Relu => (num_inputs == 1, "exactly 1"),
        };
        if !inputs_ok {
            return Err(GraphError::InvariantViolation(format!(
                "{} expects {} inputs, got {}",
                self.name(),
                expected_inputs,
                num_inputs
            )));
        }
        if num_outputs != 1 {
            return Err(GraphError::InvariantViolation(format!(
                "{} expects exactly 1 output, got {}",
                self.name(),
                num_outputs
            )));
        }
        Ok(())
    }

    /// Infers output shapes from the current input shapes.
    ///
    /// Mutable because matmul caches its `(m, n, k)` problem sizes as a side
    /// effect of inference.
    pub fn infer_shapes(&mut self, inputs: &[Shape]) -> Result<Vec<Shape>> {
        self.check_signature(inputs.len(), 1)?;
        match self {
            OpKind::Concat(spec) => spec.infer_shape(inputs).map(|shape| vec![shape]),
            OpKind::MatMul(spec) => spec
                .infer_shape(&inputs[0], &inputs[1])
                .map(|shape| vec![shape]),
            OpKind::Transpose(spec) => spec.infer_shape(&inputs[0]).map(|shape| vec![shape]),
            OpKind::Relu => Ok(vec![inputs[0].clone()]),
        }
    }
}
