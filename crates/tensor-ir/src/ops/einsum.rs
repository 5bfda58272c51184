use crate::spec::{OpError, OpResult, Shape, TensorSpec};

use super::common::{dims_broadcastable, promote_dtypes, resolve_broadcast_dim};
use super::EinsumSpec;

const OP: &str = "einsum";

/// Parsed two-operand equation: one single-letter label per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EinsumPlan {
    pub lhs: Vec<char>,
    pub rhs: Vec<char>,
    pub out: Vec<char>,
}

pub(crate) fn parse_equation(equation: &str) -> OpResult<EinsumPlan> {
    let Some((inputs, output)) = equation.split_once("->") else {
        return Err(OpError::unsupported(
            OP,
            format!("equation '{equation}' is missing '->'"),
        ));
    };
    let operands: Vec<&str> = inputs.split(',').collect();
    if operands.len() != 2 {
        return Err(OpError::unsupported(
            OP,
            format!(
                "exactly two operands are supported, equation '{equation}' names {}",
                operands.len()
            ),
        ));
    }
    Ok(EinsumPlan {
        lhs: parse_subscript(equation, operands[0])?,
        rhs: parse_subscript(equation, operands[1])?,
        out: parse_subscript(equation, output)?,
    })
}

fn parse_subscript(equation: &str, part: &str) -> OpResult<Vec<char>> {
    let mut labels = Vec::new();
    for label in part.trim().chars() {
        if !label.is_ascii_alphabetic() {
            return Err(OpError::unsupported(
                OP,
                format!("equation '{equation}' contains invalid label '{label}'"),
            ));
        }
        if labels.contains(&label) {
            return Err(OpError::unsupported(
                OP,
                format!("equation '{equation}' repeats label '{label}' within one subscript"),
            ));
        }
        labels.push(label);
    }
    Ok(labels)
}

/// Classifies each label (contracted, free, or carried through both inputs),
/// checks the paired extents, and assembles the output spec in subscript
/// order. Token-equal symbolic extents resolve to that shared token.
pub(crate) fn infer(spec: &EinsumSpec, x: &TensorSpec, y: &TensorSpec) -> OpResult<TensorSpec> {
    let plan = parse_equation(&spec.equation)?;
    let out_dtype = promote_dtypes(OP, "x", x, "y", y)?;

    if plan.lhs.len() != x.rank() {
        return Err(OpError::shape(
            OP,
            format!(
                "subscript '{}' expects rank {}, x is {}",
                subscript_string(&plan.lhs),
                plan.lhs.len(),
                x.shape
            ),
        ));
    }
    if plan.rhs.len() != y.rank() {
        return Err(OpError::shape(
            OP,
            format!(
                "subscript '{}' expects rank {}, y is {}",
                subscript_string(&plan.rhs),
                plan.rhs.len(),
                y.shape
            ),
        ));
    }

    let x_dims = x.shape.dims();
    let y_dims = y.shape.dims();

    for (i, label) in plan.lhs.iter().enumerate() {
        match plan.rhs.iter().position(|other| other == label) {
            Some(j) => {
                if !dims_broadcastable(&x_dims[i], &y_dims[j]) {
                    return Err(OpError::shape(
                        OP,
                        format!(
                            "dimension mismatch for label '{label}': {} vs {}",
                            x_dims[i], y_dims[j]
                        ),
                    ));
                }
            }
            None => {
                if !plan.out.contains(label) {
                    return Err(OpError::shape(
                        OP,
                        format!(
                            "label '{label}' appears in one input only and is missing from the output"
                        ),
                    ));
                }
            }
        }
    }
    for label in &plan.rhs {
        if !plan.lhs.contains(label) && !plan.out.contains(label) {
            return Err(OpError::shape(
                OP,
                format!(
                    "label '{label}' appears in one input only and is missing from the output"
                ),
            ));
        }
    }

    let mut out_dims = Vec::with_capacity(plan.out.len());
    for label in &plan.out {
        let lhs_dim = plan
            .lhs
            .iter()
            .position(|other| other == label)
            .map(|i| &x_dims[i]);
        let rhs_dim = plan
            .rhs
            .iter()
            .position(|other| other == label)
            .map(|j| &y_dims[j]);
        let dim = match (lhs_dim, rhs_dim) {
            (Some(a), Some(b)) => resolve_broadcast_dim(a, b),
            (Some(a), None) => a.clone(),
            (None, Some(b)) => b.clone(),
            (None, None) => {
                return Err(OpError::shape(
                    OP,
                    format!("output label '{label}' does not appear in any input"),
                ))
            }
        };
        out_dims.push(dim);
    }
    Ok(TensorSpec::new(out_dtype, Shape::new(out_dims)))
}

fn subscript_string(labels: &[char]) -> String {
    labels.iter().collect()
}
