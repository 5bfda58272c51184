use crate::spec::{Dimension, OpError, OpResult, Shape, TensorSpec};
use crate::symbol::{fnv1a_bytes, fnv1a_init, fnv1a_u64, DimSymbol};

use super::common::{dims_match, ensure_rank, promote_dtypes};
use super::ConvSpec;

const OP: &str = "conv";

/// Infers 2-d NCHW convolution: `x [N, C_in, H, W] x weight [C_out, C_in,
/// kH, kW] -> [N, C_out, H', W']`.
///
/// Symbolic spatial extents produce derived symbols interned by the conv
/// configuration, so two structurally identical convs over the same input
/// emit token-equal output dims.
pub(crate) fn infer(spec: &ConvSpec, x: &TensorSpec, weight: &TensorSpec) -> OpResult<TensorSpec> {
    ensure_rank(OP, "x", x, 4)?;
    ensure_rank(OP, "weight", weight, 4)?;
    for (what, values) in [
        ("strides", &spec.strides),
        ("dilations", &spec.dilations),
        ("padding", &spec.padding),
    ] {
        if values.len() != 2 {
            return Err(OpError::unsupported(
                OP,
                format!("{what} must list both spatial axes, got {}", values.len()),
            ));
        }
    }
    for (what, values) in [("strides", &spec.strides), ("dilations", &spec.dilations)] {
        if values.iter().any(|&value| value == 0) {
            return Err(OpError::unsupported(OP, format!("{what} must be positive")));
        }
    }
    let out_dtype = promote_dtypes(OP, "x", x, "weight", weight)?;

    let x_dims = x.shape.dims();
    let weight_dims = weight.shape.dims();
    if !dims_match(&x_dims[1], &weight_dims[1]) {
        return Err(OpError::shape(
            OP,
            format!(
                "input channel mismatch: x {} vs weight {}",
                x.shape, weight.shape
            ),
        ));
    }

    let mut out_dims = vec![x_dims[0].clone(), weight_dims[0].clone()];
    for axis in 0..2 {
        let kernel = weight_dims[2 + axis].as_static().ok_or_else(|| {
            OpError::unsupported(
                OP,
                format!("symbolic kernel extent in weight {}", weight.shape),
            )
        })?;
        if kernel == 0 {
            return Err(OpError::shape(
                OP,
                format!("kernel extent must be positive in weight {}", weight.shape),
            ));
        }
        let stride = spec.strides[axis];
        let dilation = spec.dilations[axis];
        let pad = spec.padding[axis];
        let effective = dilation * (kernel - 1) + 1;
        let out_dim = match &x_dims[2 + axis] {
            Dimension::Static(extent) => {
                let padded = extent + 2 * pad;
                if padded < effective {
                    return Err(OpError::shape(
                        OP,
                        format!(
                            "kernel window {effective} exceeds padded extent {padded} on spatial axis {axis}"
                        ),
                    ));
                }
                Dimension::Static((padded - effective) / stride + 1)
            }
            Dimension::Dynamic(sym) => Dimension::Dynamic(DimSymbol::derived(
                *sym,
                spatial_fingerprint(kernel, stride, dilation, pad),
            )),
        };
        out_dims.push(out_dim);
    }
    Ok(TensorSpec::new(out_dtype, Shape::new(out_dims)))
}

fn spatial_fingerprint(kernel: usize, stride: usize, dilation: usize, pad: usize) -> u64 {
    let mut hash = fnv1a_init();
    hash = fnv1a_bytes(hash, b"conv");
    for value in [kernel, stride, dilation, pad] {
        hash = fnv1a_u64(hash, value as u64);
    }
    hash
}
