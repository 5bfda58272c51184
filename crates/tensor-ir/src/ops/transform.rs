use std::collections::HashSet;

use crate::spec::{OpError, OpResult, Shape, TensorSpec};

use super::{CastSpec, TransposeSpec};

pub(crate) fn infer_transpose(spec: &TransposeSpec, x: &TensorSpec) -> OpResult<TensorSpec> {
    const OP: &str = "transpose";
    if spec.perm.len() != x.rank() {
        return Err(OpError::shape(
            OP,
            format!(
                "permutation length {} does not match rank of {}",
                spec.perm.len(),
                x.shape
            ),
        ));
    }
    let dims = x.shape.dims();
    let mut seen = HashSet::new();
    let mut out_dims = Vec::with_capacity(spec.perm.len());
    for &axis in &spec.perm {
        if axis >= dims.len() {
            return Err(OpError::shape(
                OP,
                format!("axis {axis} out of range for {}", x.shape),
            ));
        }
        if !seen.insert(axis) {
            return Err(OpError::shape(
                OP,
                format!("axis {axis} repeats in permutation"),
            ));
        }
        out_dims.push(dims[axis].clone());
    }
    Ok(TensorSpec::new(x.dtype, Shape::new(out_dims)))
}

/// Cast keeps the shape, symbols included, and swaps the element kind.
pub(crate) fn infer_cast(spec: &CastSpec, x: &TensorSpec) -> OpResult<TensorSpec> {
    Ok(TensorSpec::new(spec.dtype, x.shape.clone()))
}
