use std::sync::Arc;

use half::f16;
use serde::{Deserialize, Serialize};

use crate::spec::{DType, OpError, OpResult, TensorSpec};

/// Dense payload of a constant tensor, one storage variant per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    F32(Arc<[f32]>),
    F16(Arc<[f16]>),
    I32(Arc<[i32]>),
}

impl TensorData {
    pub fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::F16(_) => DType::F16,
            TensorData::I32(_) => DType::I32,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::F16(values) => values.len(),
            TensorData::I32(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable constant value conforming to a fully static `TensorSpec`.
///
/// Only concrete shapes can carry data; symbolic operands stay type-only
/// until the host executor materialises them.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    spec: TensorSpec,
    data: TensorData,
}

impl Tensor {
    /// Validates that `data` conforms to `spec` (static shape, matching
    /// dtype, matching element count) and wraps it.
    pub fn new(spec: TensorSpec, data: TensorData) -> OpResult<Self> {
        let expected = spec.element_count().ok_or_else(|| {
            OpError::shape(
                "constant",
                format!("values require a fully static shape, got {}", spec.shape),
            )
        })?;
        if data.dtype() != spec.dtype {
            return Err(OpError::type_mismatch(
                "constant",
                format!("payload is {} but spec is {}", data.dtype(), spec.dtype),
            ));
        }
        if data.len() != expected {
            return Err(OpError::shape(
                "constant",
                format!(
                    "shape {} holds {expected} elements, payload has {}",
                    spec.shape,
                    data.len()
                ),
            ));
        }
        Ok(Self { spec, data })
    }

    pub fn from_f32(dims: &[usize], values: impl Into<Vec<f32>>) -> OpResult<Self> {
        let values: Vec<f32> = values.into();
        Self::new(
            TensorSpec::from_static(DType::F32, dims),
            TensorData::F32(Arc::from(values)),
        )
    }

    pub fn from_f16(dims: &[usize], values: impl Into<Vec<f16>>) -> OpResult<Self> {
        let values: Vec<f16> = values.into();
        Self::new(
            TensorSpec::from_static(DType::F16, dims),
            TensorData::F16(Arc::from(values)),
        )
    }

    pub fn from_i32(dims: &[usize], values: impl Into<Vec<i32>>) -> OpResult<Self> {
        let values: Vec<i32> = values.into();
        Self::new(
            TensorSpec::from_static(DType::I32, dims),
            TensorData::I32(Arc::from(values)),
        )
    }

    /// Builds a zero-filled tensor, e.g. the synthesized default bias.
    pub fn zeros(dtype: DType, dims: &[usize]) -> OpResult<Self> {
        let spec = TensorSpec::from_static(dtype, dims);
        let count = spec.element_count().ok_or_else(|| {
            OpError::shape("constant", format!("element count overflow for {}", spec.shape))
        })?;
        let data = match dtype {
            DType::F32 => TensorData::F32(Arc::from(vec![0.0f32; count])),
            DType::F16 => TensorData::F16(Arc::from(vec![f16::ZERO; count])),
            DType::I32 => TensorData::I32(Arc::from(vec![0i32; count])),
        };
        Ok(Self { spec, data })
    }

    pub fn spec(&self) -> &TensorSpec {
        &self.spec
    }

    pub fn dtype(&self) -> DType {
        self.spec.dtype
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_f16(&self) -> Option<&[f16]> {
        match &self.data {
            TensorData::F16(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match &self.data {
            TensorData::I32(values) => Some(values),
            _ => None,
        }
    }

    /// Widens the payload to f32 regardless of dtype.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::F32(values) => values.to_vec(),
            TensorData::F16(values) => values.iter().map(|v| v.to_f32()).collect(),
            TensorData::I32(values) => values.iter().map(|&v| v as f32).collect(),
        }
    }
}

/// Serde-facing payload form; `Arc` slices round-trip through plain vectors.
#[derive(Serialize, Deserialize)]
enum TensorDataRepr {
    F32(Vec<f32>),
    F16(Vec<f16>),
    I32(Vec<i32>),
}

impl Serialize for Tensor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct TensorHelper<'a> {
            spec: &'a TensorSpec,
            data: TensorDataRepr,
        }

        let data = match &self.data {
            TensorData::F32(values) => TensorDataRepr::F32(values.to_vec()),
            TensorData::F16(values) => TensorDataRepr::F16(values.to_vec()),
            TensorData::I32(values) => TensorDataRepr::I32(values.to_vec()),
        };
        TensorHelper {
            spec: &self.spec,
            data,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Tensor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct TensorHelper {
            spec: TensorSpec,
            data: TensorDataRepr,
        }

        let helper = TensorHelper::deserialize(deserializer)?;
        let data = match helper.data {
            TensorDataRepr::F32(values) => TensorData::F32(Arc::from(values)),
            TensorDataRepr::F16(values) => TensorData::F16(Arc::from(values)),
            TensorDataRepr::I32(values) => TensorData::I32(Arc::from(values)),
        };
        Tensor::new(helper.spec, data).map_err(serde::de::Error::custom)
    }
}
