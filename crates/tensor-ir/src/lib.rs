pub mod builder;
pub mod eval;
pub mod graph;
pub mod ops;
pub mod spec;
pub mod symbol;
pub mod tensor;

pub use builder::{OpBuilder, OperandSource};
pub use graph::{Graph, GraphNode, GraphSerdeError, NodeId, Operand};
pub use ops::{
    validate_and_infer, CastSpec, ConvSpec, EinsumSpec, MatMulSpec, Operation, TransposeSpec,
};
pub use spec::{DType, Dimension, OpError, OpResult, Shape, TensorSpec};
pub use symbol::DimSymbol;
pub use tensor::{Tensor, TensorData};
