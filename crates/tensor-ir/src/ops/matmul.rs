use crate::spec::{Dimension, OpError, OpResult, Shape, TensorSpec};

use super::common::{broadcast_batch, dims_match, ensure_rank_at_least, promote_dtypes};
use super::MatMulSpec;

const OP: &str = "matmul";

/// Infers batched matmul with numpy semantics: rank-1 promotion, logical
/// transpose of the trailing two axes, right-aligned batch broadcast.
pub(crate) fn infer(spec: &MatMulSpec, x: &TensorSpec, y: &TensorSpec) -> OpResult<TensorSpec> {
    ensure_rank_at_least(OP, "x", x, 1)?;
    ensure_rank_at_least(OP, "y", y, 1)?;
    let out_dtype = promote_dtypes(OP, "x", x, "y", y)?;

    // Rank-1 x acts as a [1, K] row, rank-1 y as a [K, 1] column; transpose
    // flags do not apply to vectors.
    let x_vector = x.rank() == 1;
    let y_vector = y.rank() == 1;

    let mut x_dims = x.shape.dims().to_vec();
    if x_vector {
        x_dims.insert(0, Dimension::Static(1));
    } else if spec.transpose_x {
        let rank = x_dims.len();
        x_dims.swap(rank - 2, rank - 1);
    }

    let mut y_dims = y.shape.dims().to_vec();
    if y_vector {
        y_dims.push(Dimension::Static(1));
    } else if spec.transpose_y {
        let rank = y_dims.len();
        y_dims.swap(rank - 2, rank - 1);
    }

    let batch = broadcast_batch(
        OP,
        &x_dims[..x_dims.len() - 2],
        &y_dims[..y_dims.len() - 2],
    )?;

    let contract_lhs = &x_dims[x_dims.len() - 1];
    let contract_rhs = &y_dims[y_dims.len() - 2];
    if !dims_match(contract_lhs, contract_rhs) {
        return Err(OpError::shape(
            OP,
            format!(
                "contract dimension mismatch: x {} vs y {} ({contract_lhs} vs {contract_rhs})",
                x.shape, y.shape
            ),
        ));
    }

    let mut out_dims = batch;
    if !x_vector {
        out_dims.push(x_dims[x_dims.len() - 2].clone());
    }
    if !y_vector {
        out_dims.push(y_dims[y_dims.len() - 1].clone());
    }
    Ok(TensorSpec::new(out_dtype, Shape::new(out_dims)))
}
