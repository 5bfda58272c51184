pub(crate) mod common;
mod conv;
mod einsum;
mod linear;
mod matmul;
mod transform;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::spec::{DType, OpResult, TensorSpec};
use crate::tensor::Tensor;

pub(crate) use einsum::{parse_equation, EinsumPlan};
pub(crate) use linear::default_bias;

/// Small inline axis list used by inference and folding internals.
pub(crate) type Axes = SmallVec<[usize; 4]>;

/// Attribute payload for `matmul`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatMulSpec {
    pub transpose_x: bool,
    pub transpose_y: bool,
}

/// Attribute payload for `einsum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EinsumSpec {
    pub equation: String,
}

/// Attribute payload for `conv` (2-d, NCHW, symmetric zero padding).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvSpec {
    pub strides: Vec<usize>,
    pub dilations: Vec<usize>,
    pub padding: Vec<usize>,
}

impl ConvSpec {
    /// Stride 1, dilation 1, no padding.
    pub fn unit() -> Self {
        Self {
            strides: vec![1, 1],
            dilations: vec![1, 1],
            padding: vec![0, 0],
        }
    }
}

/// Permutation payload for `transpose`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransposeSpec {
    pub perm: Vec<usize>,
}

/// Attribute payload for `cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastSpec {
    pub dtype: DType,
}

/// Declarative form of graph operations. Closed set; every consumer
/// dispatches by exhaustive match rather than by name lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Type-only placeholder supplied by the frontend.
    Input(TensorSpec),
    /// Constant source carrying its value.
    Constant(Tensor),
    Linear,
    MatMul(MatMulSpec),
    Einsum(EinsumSpec),
    Conv(ConvSpec),
    Transpose(TransposeSpec),
    Cast(CastSpec),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Input(_) => "input",
            Operation::Constant(_) => "constant",
            Operation::Linear => "linear",
            Operation::MatMul(_) => "matmul",
            Operation::Einsum(_) => "einsum",
            Operation::Conv(_) => "conv",
            Operation::Transpose(_) => "transpose",
            Operation::Cast(_) => "cast",
        }
    }
}

/// Validates an operation against its operand specs and infers the output
/// spec. Pure; symbolic dims defer their checks to the executor and are
/// never rejected here on their own.
pub fn validate_and_infer(op: &Operation, inputs: &[TensorSpec]) -> OpResult<TensorSpec> {
    match op {
        Operation::Input(spec) => {
            arity(op, inputs, 0)?;
            Ok(spec.clone())
        }
        Operation::Constant(tensor) => {
            arity(op, inputs, 0)?;
            Ok(tensor.spec().clone())
        }
        Operation::Linear => linear::infer(inputs),
        Operation::MatMul(spec) => {
            arity(op, inputs, 2)?;
            matmul::infer(spec, &inputs[0], &inputs[1])
        }
        Operation::Einsum(spec) => {
            arity(op, inputs, 2)?;
            einsum::infer(spec, &inputs[0], &inputs[1])
        }
        Operation::Conv(spec) => {
            arity(op, inputs, 2)?;
            conv::infer(spec, &inputs[0], &inputs[1])
        }
        Operation::Transpose(spec) => {
            arity(op, inputs, 1)?;
            transform::infer_transpose(spec, &inputs[0])
        }
        Operation::Cast(spec) => {
            arity(op, inputs, 1)?;
            transform::infer_cast(spec, &inputs[0])
        }
    }
}

fn arity(op: &Operation, inputs: &[TensorSpec], expected: usize) -> OpResult<()> {
    if inputs.len() != expected {
        return Err(crate::spec::OpError::shape(
            op.name(),
            format!("expects {expected} operands, got {}", inputs.len()),
        ));
    }
    Ok(())
}
