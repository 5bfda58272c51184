use crate::spec::{OpError, OpResult, Shape, TensorSpec};
use crate::tensor::Tensor;

use super::common::{dims_match, ensure_rank, ensure_rank_at_least, promote_dtypes};

const OP: &str = "linear";

/// Infers `x [.., in] x weight [out, in] (+ bias [out]) -> [.., out]`.
pub(crate) fn infer(inputs: &[TensorSpec]) -> OpResult<TensorSpec> {
    let (x, weight, bias) = match inputs {
        [x, weight] => (x, weight, None),
        [x, weight, bias] => (x, weight, Some(bias)),
        _ => {
            return Err(OpError::shape(
                OP,
                format!(
                    "expects x, weight, and optional bias, got {} operands",
                    inputs.len()
                ),
            ))
        }
    };

    ensure_rank_at_least(OP, "x", x, 1)?;
    ensure_rank(OP, "weight", weight, 2)?;
    let out_dtype = promote_dtypes(OP, "x", x, "weight", weight)?;

    let x_dims = x.shape.dims();
    let weight_dims = weight.shape.dims();
    let out_channels = &weight_dims[0];
    let in_channels = &weight_dims[1];
    if !dims_match(&x_dims[x_dims.len() - 1], in_channels) {
        return Err(OpError::shape(
            OP,
            format!(
                "inner dimension mismatch: x {} vs weight {}",
                x.shape, weight.shape
            ),
        ));
    }

    if let Some(bias) = bias {
        ensure_rank(OP, "bias", bias, 1)?;
        if bias.dtype != out_dtype {
            return Err(OpError::type_mismatch(
                OP,
                format!("bias is {} but output is {out_dtype}", bias.dtype),
            ));
        }
        if !dims_match(&bias.shape.dims()[0], out_channels) {
            return Err(OpError::shape(
                OP,
                format!(
                    "bias {} does not match out_channels {out_channels}",
                    bias.shape
                ),
            ));
        }
    }

    let mut out_dims = x_dims.to_vec();
    let last = out_dims.len() - 1;
    out_dims[last] = out_channels.clone();
    Ok(TensorSpec::new(out_dtype, Shape::new(out_dims)))
}

/// Synthesizes the zero bias recorded when the caller omits one. The bias
/// takes the promoted dtype of `x`/`weight`, so a pre-cast input yields a
/// bias of the same kind. `None` when `out_channels` is symbolic or when
/// `infer` is about to reject the operands anyway.
pub(crate) fn default_bias(x: &TensorSpec, weight: &TensorSpec) -> OpResult<Option<Tensor>> {
    if weight.rank() != 2 {
        return Ok(None);
    }
    let Some(dtype) = x.dtype.promote(weight.dtype) else {
        return Ok(None);
    };
    match weight.shape.dims()[0].as_static() {
        Some(out_channels) => Ok(Some(Tensor::zeros(dtype, &[out_channels])?)),
        None => Ok(None),
    }
}
