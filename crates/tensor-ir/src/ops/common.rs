use crate::spec::{DType, Dimension, OpError, OpResult, TensorSpec};

pub(crate) fn ensure_rank(
    op: &'static str,
    what: &str,
    spec: &TensorSpec,
    rank: usize,
) -> OpResult<()> {
    if spec.rank() != rank {
        return Err(OpError::shape(
            op,
            format!("{what} must have rank {rank}, got {}", spec.shape),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_rank_at_least(
    op: &'static str,
    what: &str,
    spec: &TensorSpec,
    rank: usize,
) -> OpResult<()> {
    if spec.rank() < rank {
        return Err(OpError::shape(
            op,
            format!("{what} must have rank at least {rank}, got {}", spec.shape),
        ));
    }
    Ok(())
}

pub(crate) fn promote_dtypes(
    op: &'static str,
    lhs_what: &str,
    lhs: &TensorSpec,
    rhs_what: &str,
    rhs: &TensorSpec,
) -> OpResult<DType> {
    lhs.dtype.promote(rhs.dtype).ok_or_else(|| {
        OpError::type_mismatch(
            op,
            format!("{lhs_what} is {} but {rhs_what} is {}", lhs.dtype, rhs.dtype),
        )
    })
}

/// Two extents agree when equal or when either is symbolic.
pub(crate) fn dims_match(a: &Dimension, b: &Dimension) -> bool {
    match (a, b) {
        (Dimension::Static(x), Dimension::Static(y)) => x == y,
        _ => true,
    }
}

/// Broadcast compatibility: equal, one side is exactly 1, or either symbolic.
pub(crate) fn dims_broadcastable(a: &Dimension, b: &Dimension) -> bool {
    match (a, b) {
        (Dimension::Static(x), Dimension::Static(y)) => x == y || *x == 1 || *y == 1,
        _ => true,
    }
}

/// Resolves the output extent of two broadcast-compatible dims. Prefers the
/// non-1 concrete extent, then concrete over symbolic, then the left token.
pub(crate) fn resolve_broadcast_dim(a: &Dimension, b: &Dimension) -> Dimension {
    match (a, b) {
        (Dimension::Static(1), _) => b.clone(),
        (_, Dimension::Static(1)) => a.clone(),
        (Dimension::Static(_), _) => a.clone(),
        (_, Dimension::Static(_)) => b.clone(),
        (Dimension::Dynamic(_), Dimension::Dynamic(_)) => a.clone(),
    }
}

/// Right-aligned dim lookup; leading positions missing from `dims` act as 1.
pub(crate) fn aligned_dim(dims: &[Dimension], offset: usize, axis: usize) -> Dimension {
    if axis < offset {
        Dimension::Static(1)
    } else {
        dims[axis - offset].clone()
    }
}

/// Broadcasts two batch-dim lists pairwise, right-aligned.
pub(crate) fn broadcast_batch(
    op: &'static str,
    lhs: &[Dimension],
    rhs: &[Dimension],
) -> OpResult<Vec<Dimension>> {
    let rank = lhs.len().max(rhs.len());
    let lhs_offset = rank - lhs.len();
    let rhs_offset = rank - rhs.len();
    let mut out = Vec::with_capacity(rank);
    for axis in 0..rank {
        let a = aligned_dim(lhs, lhs_offset, axis);
        let b = aligned_dim(rhs, rhs_offset, axis);
        if !dims_broadcastable(&a, &b) {
            return Err(OpError::shape(
                op,
                format!("batch dimension mismatch at axis {axis}: {a} vs {b}"),
            ));
        }
        out.push(resolve_broadcast_dim(&a, &b));
    }
    Ok(out)
}
