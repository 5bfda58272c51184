//! Eager evaluation of operations over concrete tensors.
//!
//! [`fold`] re-runs shape inference on the operand specs and then applies
//! the same mathematical rule to the payloads, so a folded value always
//! conforms to the node's inferred output spec. The three algebra ops all
//! lower to one labelled-contraction kernel driven by a [`ContractionPlan`];
//! broadcast axes and missing leading batch dims are read with stride 0.

use std::sync::Arc;

use half::f16;
use smallvec::smallvec;

use crate::ops::{
    parse_equation, validate_and_infer, Axes, CastSpec, EinsumPlan, EinsumSpec, MatMulSpec,
    Operation, TransposeSpec,
};
use crate::spec::{DType, OpError, OpResult, TensorSpec};
use crate::tensor::{Tensor, TensorData};

/// Evaluates `op` at concrete operand values.
///
/// Returns `Ok(None)` for operations without a folding rule (`input`, which
/// has no value, and `conv`, which is inferred but never folded).
pub fn fold(op: &Operation, inputs: &[Tensor]) -> OpResult<Option<Tensor>> {
    let specs: Vec<TensorSpec> = inputs.iter().map(|tensor| tensor.spec().clone()).collect();
    let output = validate_and_infer(op, &specs)?;
    match op {
        Operation::Input(_) => Ok(None),
        Operation::Constant(tensor) => Ok(Some(tensor.clone())),
        Operation::Linear => fold_linear(inputs, &output).map(Some),
        Operation::MatMul(spec) => fold_matmul(spec, inputs, &output).map(Some),
        Operation::Einsum(spec) => fold_einsum(spec, inputs, &output).map(Some),
        Operation::Conv(_) => Ok(None),
        Operation::Transpose(spec) => fold_transpose(spec, inputs, &output).map(Some),
        Operation::Cast(spec) => fold_cast(spec, inputs, &output).map(Some),
    }
}

/// Iterated extents of one contraction, with one stride per coordinate for
/// each operand and for the output. A stride of 0 pins the operand to its
/// only element along that coordinate.
struct ContractionPlan {
    batch: Axes,
    lhs_free: Axes,
    rhs_free: Axes,
    contract: Axes,
    lhs_batch_strides: Axes,
    lhs_free_strides: Axes,
    lhs_contract_strides: Axes,
    rhs_batch_strides: Axes,
    rhs_free_strides: Axes,
    rhs_contract_strides: Axes,
    out_batch_strides: Axes,
    out_lhs_strides: Axes,
    out_rhs_strides: Axes,
}

trait Accumulate: Copy {
    const ZERO: Self;
    fn mul_acc(self, lhs: Self, rhs: Self) -> Self;
}

impl Accumulate for f32 {
    const ZERO: Self = 0.0;
    fn mul_acc(self, lhs: Self, rhs: Self) -> Self {
        self + lhs * rhs
    }
}

impl Accumulate for i32 {
    const ZERO: Self = 0;
    fn mul_acc(self, lhs: Self, rhs: Self) -> Self {
        self.wrapping_add(lhs.wrapping_mul(rhs))
    }
}

fn run_contraction<T: Accumulate>(
    plan: &ContractionPlan,
    lhs: &[T],
    rhs: &[T],
    out_len: usize,
) -> Vec<T> {
    let mut out = vec![T::ZERO; out_len];
    for batch_index in MultiIndex::new(&plan.batch) {
        for lhs_index in MultiIndex::new(&plan.lhs_free) {
            for rhs_index in MultiIndex::new(&plan.rhs_free) {
                let mut acc = T::ZERO;
                for contract_index in MultiIndex::new(&plan.contract) {
                    let lhs_offset = build_index(
                        &plan.lhs_batch_strides,
                        &plan.lhs_free_strides,
                        &plan.lhs_contract_strides,
                        &batch_index,
                        &lhs_index,
                        &contract_index,
                    );
                    let rhs_offset = build_index(
                        &plan.rhs_batch_strides,
                        &plan.rhs_free_strides,
                        &plan.rhs_contract_strides,
                        &batch_index,
                        &rhs_index,
                        &contract_index,
                    );
                    acc = acc.mul_acc(lhs[lhs_offset], rhs[rhs_offset]);
                }
                let out_offset = build_index(
                    &plan.out_batch_strides,
                    &plan.out_lhs_strides,
                    &plan.out_rhs_strides,
                    &batch_index,
                    &lhs_index,
                    &rhs_index,
                );
                out[out_offset] = acc;
            }
        }
    }
    out
}

fn contract_values(
    op: &'static str,
    plan: &ContractionPlan,
    lhs: &Tensor,
    rhs: &Tensor,
    output: &TensorSpec,
) -> OpResult<Tensor> {
    let out_len = output
        .element_count()
        .ok_or_else(|| OpError::shape(op, format!("cannot fold symbolic output {}", output.shape)))?;
    let data = match (lhs.data(), rhs.data()) {
        (TensorData::F32(a), TensorData::F32(b)) => {
            TensorData::F32(Arc::from(run_contraction(plan, a.as_ref(), b.as_ref(), out_len)))
        }
        (TensorData::F16(a), TensorData::F16(b)) => {
            // f16 accumulates in f32 and narrows once at the end.
            let a: Vec<f32> = a.iter().map(|v| v.to_f32()).collect();
            let b: Vec<f32> = b.iter().map(|v| v.to_f32()).collect();
            let wide = run_contraction(plan, &a, &b, out_len);
            let narrow: Vec<f16> = wide.into_iter().map(f16::from_f32).collect();
            TensorData::F16(Arc::from(narrow))
        }
        (TensorData::I32(a), TensorData::I32(b)) => {
            TensorData::I32(Arc::from(run_contraction(plan, a.as_ref(), b.as_ref(), out_len)))
        }
        _ => return Err(OpError::type_mismatch(op, "operand payloads disagree")),
    };
    Tensor::new(output.clone(), data)
}

fn fold_linear(inputs: &[Tensor], output: &TensorSpec) -> OpResult<Tensor> {
    const OP: &str = "linear";
    let (x, weight, bias) = match inputs {
        [x, weight] => (x, weight, None),
        [x, weight, bias] => (x, weight, Some(bias)),
        _ => {
            return Err(OpError::shape(
                OP,
                format!("expects x, weight, and optional bias, got {} operands", inputs.len()),
            ))
        }
    };
    let x_dims = static_dims(OP, x.spec())?;
    let weight_dims = static_dims(OP, weight.spec())?;
    let out_dims = static_dims(OP, output)?;

    let x_strides = compute_strides(&x_dims);
    let weight_strides = compute_strides(&weight_dims);
    let out_strides = compute_strides(&out_dims);
    let lead = x_dims.len() - 1;
    let plan = ContractionPlan {
        batch: Axes::new(),
        lhs_free: Axes::from_slice(&x_dims[..lead]),
        rhs_free: smallvec![weight_dims[0]],
        contract: smallvec![x_dims[lead]],
        lhs_batch_strides: Axes::new(),
        lhs_free_strides: Axes::from_slice(&x_strides[..lead]),
        lhs_contract_strides: smallvec![x_strides[lead]],
        rhs_batch_strides: Axes::new(),
        rhs_free_strides: smallvec![weight_strides[0]],
        rhs_contract_strides: smallvec![weight_strides[1]],
        out_batch_strides: Axes::new(),
        out_lhs_strides: Axes::from_slice(&out_strides[..lead]),
        out_rhs_strides: smallvec![out_strides[lead]],
    };
    let result = contract_values(OP, &plan, x, weight, output)?;
    match bias {
        Some(bias) => add_bias(OP, result, bias),
        None => Ok(result),
    }
}

fn add_bias(op: &'static str, result: Tensor, bias: &Tensor) -> OpResult<Tensor> {
    let out_channels = bias.len();
    let data = match (result.data(), bias.data()) {
        (TensorData::F32(values), TensorData::F32(bias_values)) => {
            let mut out = values.to_vec();
            for (i, slot) in out.iter_mut().enumerate() {
                *slot += bias_values[i % out_channels];
            }
            TensorData::F32(Arc::from(out))
        }
        (TensorData::F16(values), TensorData::F16(bias_values)) => {
            let mut out: Vec<f16> = values.to_vec();
            for (i, slot) in out.iter_mut().enumerate() {
                let sum = slot.to_f32() + bias_values[i % out_channels].to_f32();
                *slot = f16::from_f32(sum);
            }
            TensorData::F16(Arc::from(out))
        }
        (TensorData::I32(values), TensorData::I32(bias_values)) => {
            let mut out = values.to_vec();
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = slot.wrapping_add(bias_values[i % out_channels]);
            }
            TensorData::I32(Arc::from(out))
        }
        _ => return Err(OpError::type_mismatch(op, "bias payload disagrees with output")),
    };
    Tensor::new(result.spec().clone(), data)
}

fn fold_matmul(spec: &MatMulSpec, inputs: &[Tensor], output: &TensorSpec) -> OpResult<Tensor> {
    const OP: &str = "matmul";
    let (x, y) = expect_pair(OP, inputs)?;
    let out_dims = static_dims(OP, output)?;

    // Mirror the shape rule: promote vectors to matrices, then apply the
    // transpose flags as a strided view instead of moving data.
    let x_vector = x.spec().rank() == 1;
    let y_vector = y.spec().rank() == 1;
    let mut x_dims = static_dims(OP, x.spec())?;
    if x_vector {
        x_dims.insert(0, 1);
    }
    let mut y_dims = static_dims(OP, y.spec())?;
    if y_vector {
        y_dims.push(1);
    }
    let mut x_strides = compute_strides(&x_dims);
    let mut y_strides = compute_strides(&y_dims);
    if spec.transpose_x && !x_vector {
        let rank = x_dims.len();
        x_dims.swap(rank - 2, rank - 1);
        x_strides.swap(rank - 2, rank - 1);
    }
    if spec.transpose_y && !y_vector {
        let rank = y_dims.len();
        y_dims.swap(rank - 2, rank - 1);
        y_strides.swap(rank - 2, rank - 1);
    }

    let x_rank = x_dims.len();
    let y_rank = y_dims.len();
    let batch_rank = out_dims.len() - usize::from(!x_vector) - usize::from(!y_vector);
    let batch = Axes::from_slice(&out_dims[..batch_rank]);
    let out_strides = compute_strides(&out_dims);

    let plan = ContractionPlan {
        lhs_free: if x_vector { Axes::new() } else { smallvec![x_dims[x_rank - 2]] },
        rhs_free: if y_vector { Axes::new() } else { smallvec![y_dims[y_rank - 1]] },
        contract: smallvec![x_dims[x_rank - 1]],
        lhs_batch_strides: broadcast_strides(&batch, &x_dims[..x_rank - 2], &x_strides),
        rhs_batch_strides: broadcast_strides(&batch, &y_dims[..y_rank - 2], &y_strides),
        lhs_free_strides: if x_vector { Axes::new() } else { smallvec![x_strides[x_rank - 2]] },
        rhs_free_strides: if y_vector { Axes::new() } else { smallvec![y_strides[y_rank - 1]] },
        lhs_contract_strides: smallvec![x_strides[x_rank - 1]],
        rhs_contract_strides: smallvec![y_strides[y_rank - 2]],
        out_batch_strides: Axes::from_slice(&out_strides[..batch_rank]),
        out_lhs_strides: if x_vector {
            Axes::new()
        } else {
            smallvec![out_strides[batch_rank]]
        },
        out_rhs_strides: if y_vector {
            Axes::new()
        } else {
            smallvec![out_strides[batch_rank + usize::from(!x_vector)]]
        },
        batch,
    };
    contract_values(OP, &plan, x, y, output)
}

/// Right-aligns an operand's batch dims against the broadcast batch extents.
/// Missing leading axes and size-1 axes broadcast with stride 0.
fn broadcast_strides(batch: &[usize], operand_batch: &[usize], operand_strides: &[usize]) -> Axes {
    let offset = batch.len() - operand_batch.len();
    let mut strides = Axes::with_capacity(batch.len());
    for (axis, &extent) in batch.iter().enumerate() {
        if axis < offset || (operand_batch[axis - offset] == 1 && extent > 1) {
            strides.push(0);
        } else {
            strides.push(operand_strides[axis - offset]);
        }
    }
    strides
}

fn fold_einsum(spec: &EinsumSpec, inputs: &[Tensor], output: &TensorSpec) -> OpResult<Tensor> {
    const OP: &str = "einsum";
    let (x, y) = expect_pair(OP, inputs)?;
    let labels: EinsumPlan = parse_equation(&spec.equation)?;
    let x_dims = static_dims(OP, x.spec())?;
    let y_dims = static_dims(OP, y.spec())?;
    let out_dims = static_dims(OP, output)?;

    let mut batch_labels: Vec<char> = Vec::new();
    let mut contract_labels: Vec<char> = Vec::new();
    let mut lhs_free_labels: Vec<char> = Vec::new();
    let mut rhs_free_labels: Vec<char> = Vec::new();
    for label in &labels.lhs {
        if labels.rhs.contains(label) {
            if labels.out.contains(label) {
                batch_labels.push(*label);
            } else {
                contract_labels.push(*label);
            }
        } else {
            lhs_free_labels.push(*label);
        }
    }
    for label in &labels.rhs {
        if !labels.lhs.contains(label) {
            rhs_free_labels.push(*label);
        }
    }

    // Broadcast-resolved extent per label.
    let extent = |label: char| -> usize {
        let a = labels.lhs.iter().position(|l| *l == label).map(|i| x_dims[i]);
        let b = labels.rhs.iter().position(|l| *l == label).map(|i| y_dims[i]);
        match (a, b) {
            (Some(1), Some(b)) => b,
            (Some(a), _) => a,
            (None, Some(b)) => b,
            (None, None) => 1,
        }
    };
    let operand_strides = |class: &[char], subscript: &[char], dims: &[usize], strides: &[usize]| -> Axes {
        class
            .iter()
            .map(|label| match subscript.iter().position(|l| l == label) {
                Some(axis) if dims[axis] == 1 && extent(*label) > 1 => 0,
                Some(axis) => strides[axis],
                None => 0,
            })
            .collect()
    };
    let out_strides = compute_strides(&out_dims);
    let output_strides = |class: &[char]| -> Axes {
        class
            .iter()
            .map(|label| match labels.out.iter().position(|l| l == label) {
                Some(axis) => out_strides[axis],
                None => 0,
            })
            .collect()
    };

    let x_strides = compute_strides(&x_dims);
    let y_strides = compute_strides(&y_dims);
    let plan = ContractionPlan {
        batch: batch_labels.iter().map(|&l| extent(l)).collect(),
        lhs_free: lhs_free_labels.iter().map(|&l| extent(l)).collect(),
        rhs_free: rhs_free_labels.iter().map(|&l| extent(l)).collect(),
        contract: contract_labels.iter().map(|&l| extent(l)).collect(),
        lhs_batch_strides: operand_strides(&batch_labels, &labels.lhs, &x_dims, &x_strides),
        lhs_free_strides: operand_strides(&lhs_free_labels, &labels.lhs, &x_dims, &x_strides),
        lhs_contract_strides: operand_strides(&contract_labels, &labels.lhs, &x_dims, &x_strides),
        rhs_batch_strides: operand_strides(&batch_labels, &labels.rhs, &y_dims, &y_strides),
        rhs_free_strides: operand_strides(&rhs_free_labels, &labels.rhs, &y_dims, &y_strides),
        rhs_contract_strides: operand_strides(&contract_labels, &labels.rhs, &y_dims, &y_strides),
        out_batch_strides: output_strides(&batch_labels),
        out_lhs_strides: output_strides(&lhs_free_labels),
        out_rhs_strides: output_strides(&rhs_free_labels),
    };
    contract_values(OP, &plan, x, y, output)
}

fn fold_transpose(spec: &TransposeSpec, inputs: &[Tensor], output: &TensorSpec) -> OpResult<Tensor> {
    const OP: &str = "transpose";
    let input = expect_single(OP, inputs)?;
    let input_dims = static_dims(OP, input.spec())?;
    let out_dims = static_dims(OP, output)?;
    let input_strides = compute_strides(&input_dims);
    let data = match input.data() {
        TensorData::F32(values) => TensorData::F32(Arc::from(gather_transposed(
            values.as_ref(),
            &input_strides,
            &spec.perm,
            &out_dims,
        ))),
        TensorData::F16(values) => TensorData::F16(Arc::from(gather_transposed(
            values.as_ref(),
            &input_strides,
            &spec.perm,
            &out_dims,
        ))),
        TensorData::I32(values) => TensorData::I32(Arc::from(gather_transposed(
            values.as_ref(),
            &input_strides,
            &spec.perm,
            &out_dims,
        ))),
    };
    Tensor::new(output.clone(), data)
}

fn gather_transposed<T: Copy>(
    values: &[T],
    input_strides: &[usize],
    perm: &[usize],
    out_dims: &[usize],
) -> Vec<T> {
    let len: usize = out_dims.iter().product();
    let mut result = Vec::with_capacity(len);
    for index in 0..len {
        let out_coord = unravel_index(index, out_dims);
        let mut offset = 0usize;
        for (out_axis, &coord) in out_coord.iter().enumerate() {
            offset += coord * input_strides[perm[out_axis]];
        }
        result.push(values[offset]);
    }
    result
}

fn fold_cast(spec: &CastSpec, inputs: &[Tensor], output: &TensorSpec) -> OpResult<Tensor> {
    const OP: &str = "cast";
    let input = expect_single(OP, inputs)?;
    let data = match (input.data(), spec.dtype) {
        (TensorData::F32(values), DType::F32) => TensorData::F32(values.clone()),
        (TensorData::F16(values), DType::F16) => TensorData::F16(values.clone()),
        (TensorData::I32(values), DType::I32) => TensorData::I32(values.clone()),
        (TensorData::F32(values), DType::F16) => {
            let out: Vec<f16> = values.iter().map(|&v| f16::from_f32(v)).collect();
            TensorData::F16(Arc::from(out))
        }
        (TensorData::F32(values), DType::I32) => {
            let out: Vec<i32> = values.iter().map(|&v| f32_to_i32_trunc_saturating(v)).collect();
            TensorData::I32(Arc::from(out))
        }
        (TensorData::F16(values), DType::F32) => {
            let out: Vec<f32> = values.iter().map(|v| v.to_f32()).collect();
            TensorData::F32(Arc::from(out))
        }
        (TensorData::F16(values), DType::I32) => {
            let out: Vec<i32> = values
                .iter()
                .map(|v| f32_to_i32_trunc_saturating(v.to_f32()))
                .collect();
            TensorData::I32(Arc::from(out))
        }
        (TensorData::I32(values), DType::F32) => {
            let out: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            TensorData::F32(Arc::from(out))
        }
        (TensorData::I32(values), DType::F16) => {
            let out: Vec<f16> = values.iter().map(|&v| f16::from_f32(v as f32)).collect();
            TensorData::F16(Arc::from(out))
        }
    };
    Tensor::new(output.clone(), data)
}

/// Truncates toward zero and saturates at the i32 range; NaN maps to 0.
fn f32_to_i32_trunc_saturating(value: f32) -> i32 {
    if value.is_nan() {
        return 0;
    }
    let truncated = value.trunc();
    if truncated <= i32::MIN as f32 {
        i32::MIN
    } else if truncated >= i32::MAX as f32 {
        i32::MAX
    } else {
        truncated as i32
    }
}

fn expect_single<'t>(op: &'static str, inputs: &'t [Tensor]) -> OpResult<&'t Tensor> {
    match inputs {
        [input] => Ok(input),
        _ => Err(OpError::shape(
            op,
            format!("expects one operand, got {}", inputs.len()),
        )),
    }
}

fn expect_pair<'t>(op: &'static str, inputs: &'t [Tensor]) -> OpResult<(&'t Tensor, &'t Tensor)> {
    match inputs {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(OpError::shape(
            op,
            format!("expects two operands, got {}", inputs.len()),
        )),
    }
}

fn static_dims(op: &'static str, spec: &TensorSpec) -> OpResult<Vec<usize>> {
    spec.shape
        .static_dims()
        .ok_or_else(|| OpError::shape(op, format!("cannot fold symbolic shape {}", spec.shape)))
}

fn compute_strides(dims: &[usize]) -> Axes {
    let mut strides: Axes = smallvec![0usize; dims.len()];
    let mut acc = 1usize;
    for (axis, dim) in dims.iter().enumerate().rev() {
        strides[axis] = acc;
        acc = acc.saturating_mul(*dim);
    }
    strides
}

fn unravel_index(mut index: usize, dims: &[usize]) -> Axes {
    let mut coords: Axes = smallvec![0usize; dims.len()];
    for axis in (0..dims.len()).rev() {
        let dim = dims[axis].max(1);
        coords[axis] = index % dim;
        index /= dim;
    }
    coords
}

fn build_index(
    batch_strides: &[usize],
    free_strides: &[usize],
    contract_strides: &[usize],
    batch_index: &[usize],
    free_index: &[usize],
    contract_index: &[usize],
) -> usize {
    let mut index = 0usize;
    for (&coord, &stride) in batch_index.iter().zip(batch_strides) {
        index += coord * stride;
    }
    for (&coord, &stride) in free_index.iter().zip(free_strides) {
        index += coord * stride;
    }
    for (&coord, &stride) in contract_index.iter().zip(contract_strides) {
        index += coord * stride;
    }
    index
}

struct MultiIndex {
    shape: Axes,
    current: Axes,
    first: bool,
}

impl MultiIndex {
    fn new(shape: &[usize]) -> Self {
        Self {
            shape: Axes::from_slice(shape),
            current: smallvec![0usize; shape.len()],
            first: true,
        }
    }
}

impl Iterator for MultiIndex {
    type Item = Axes;

    fn next(&mut self) -> Option<Axes> {
        if self.shape.iter().any(|&dim| dim == 0) {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.current.clone());
        }
        for axis in (0..self.shape.len()).rev() {
            self.current[axis] += 1;
            if self.current[axis] < self.shape[axis] {
                return Some(self.current.clone());
            }
            self.current[axis] = 0;
        }
        None
    }
}
