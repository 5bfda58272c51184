use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::symbol::DimSymbol;

/// Enumerates scalar element kinds supported by the IR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    I32,
    F16,
    F32,
}

impl DType {
    /// Returns `true` when the dtype is an integer kind.
    pub fn is_integer(self) -> bool {
        matches!(self, DType::I32)
    }

    /// Returns `true` when the dtype is a floating-point kind.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32)
    }

    /// Returns the storage size in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F16 => 2,
            DType::I32 | DType::F32 => 4,
        }
    }

    /// Returns the common dtype of two operands, or `None` when no implicit
    /// promotion exists. Mixed kinds require an explicit `cast` upstream.
    pub fn promote(self, other: DType) -> Option<DType> {
        if self == other {
            Some(self)
        } else {
            None
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::I32 => "i32",
            DType::F16 => "f16",
            DType::F32 => "f32",
        };
        write!(f, "{name}")
    }
}

/// Represents a single axis extent in a tensor shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    Static(usize),
    Dynamic(DimSymbol),
}

impl Dimension {
    pub fn is_static(&self) -> bool {
        matches!(self, Dimension::Static(_))
    }

    pub fn as_static(&self) -> Option<usize> {
        match self {
            Dimension::Static(value) => Some(*value),
            Dimension::Dynamic(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<DimSymbol> {
        match self {
            Dimension::Static(_) => None,
            Dimension::Dynamic(sym) => Some(*sym),
        }
    }
}

impl From<usize> for Dimension {
    fn from(value: usize) -> Self {
        Dimension::Static(value)
    }
}

impl From<DimSymbol> for Dimension {
    fn from(sym: DimSymbol) -> Self {
        Dimension::Dynamic(sym)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dimension::Static(value) => write!(f, "{value}"),
            Dimension::Dynamic(sym) => write!(f, "{sym}"),
        }
    }
}

/// Logical tensor shape as an ordered list of dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Vec<Dimension>,
}

impl Shape {
    pub fn new(dims: impl Into<Vec<Dimension>>) -> Self {
        Self { dims: dims.into() }
    }

    /// Builds a fully static shape from concrete extents.
    pub fn from_static(dims: &[usize]) -> Self {
        Self {
            dims: dims.iter().map(|&d| Dimension::Static(d)).collect(),
        }
    }

    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn into_dims(self) -> Vec<Dimension> {
        self.dims
    }

    /// Returns concrete extents when every dimension is static.
    pub fn static_dims(&self) -> Option<Vec<usize>> {
        let mut dims = Vec::with_capacity(self.dims.len());
        for dim in &self.dims {
            match dim {
                Dimension::Static(value) => dims.push(*value),
                Dimension::Dynamic(_) => return None,
            }
        }
        Some(dims)
    }

    /// Returns the element count when the shape is fully static.
    pub fn element_count(&self) -> Option<usize> {
        let dims = self.static_dims()?;
        let mut count = 1usize;
        for dim in dims {
            count = count.checked_mul(dim)?;
        }
        Some(count)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

/// Tensor metadata coupling dtype and shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorSpec {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    /// Builds a spec with fully static extents.
    pub fn from_static(dtype: DType, dims: &[usize]) -> Self {
        Self {
            dtype,
            shape: Shape::from_static(dims),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn element_count(&self) -> Option<usize> {
        self.shape.element_count()
    }
}

impl fmt::Display for TensorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.shape, self.dtype)
    }
}

/// Build-time failure raised while validating or folding an operation.
///
/// Every variant names the operator that rejected its operands; the detail
/// embeds the offending shapes or kinds. All errors signal a defect in the
/// calling graph-construction code, never a transient condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    #[error("{op}: shape mismatch: {detail}")]
    Shape { op: &'static str, detail: String },
    #[error("{op}: type mismatch: {detail}")]
    Type { op: &'static str, detail: String },
    #[error("{op}: unsupported configuration: {detail}")]
    Unsupported { op: &'static str, detail: String },
}

impl OpError {
    pub fn shape(op: &'static str, detail: impl Into<String>) -> Self {
        OpError::Shape {
            op,
            detail: detail.into(),
        }
    }

    pub fn type_mismatch(op: &'static str, detail: impl Into<String>) -> Self {
        OpError::Type {
            op,
            detail: detail.into(),
        }
    }

    pub fn unsupported(op: &'static str, detail: impl Into<String>) -> Self {
        OpError::Unsupported {
            op,
            detail: detail.into(),
        }
    }

    /// Operator that raised the error.
    pub fn op(&self) -> &'static str {
        match self {
            OpError::Shape { op, .. }
            | OpError::Type { op, .. }
            | OpError::Unsupported { op, .. } => *op,
        }
    }
}

/// Convenience alias for results returned by builder and evaluator routines.
pub type OpResult<T> = Result<T, OpError>;
