use crate::eval;
use crate::graph::{Graph, NodeId, Operand};
use crate::ops::{self, CastSpec, ConvSpec, EinsumSpec, MatMulSpec, Operation, TransposeSpec};
use crate::spec::{DType, OpError, OpResult, TensorSpec};
use crate::tensor::Tensor;

/// Named input accepted by builder methods: a raw constant or the output of
/// an upstream node.
#[derive(Debug, Clone)]
pub enum OperandSource {
    Tensor(Tensor),
    Node(NodeId),
}

impl From<Tensor> for OperandSource {
    fn from(tensor: Tensor) -> Self {
        OperandSource::Tensor(tensor)
    }
}

impl From<NodeId> for OperandSource {
    fn from(id: NodeId) -> Self {
        OperandSource::Node(id)
    }
}

struct Resolved {
    operand: Operand,
    spec: TensorSpec,
}

/// Appends typed nodes to a [`Graph`].
///
/// Every op method validates its operands, infers the output spec, and, when
/// all operands carry values, folds the result eagerly onto the new node.
/// A failed build returns the error without touching the graph.
pub struct OpBuilder<'g> {
    graph: &'g mut Graph,
}

impl<'g> OpBuilder<'g> {
    pub fn new(graph: &'g mut Graph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// Declares a type-only placeholder supplied by the frontend.
    pub fn input(&mut self, spec: TensorSpec) -> NodeId {
        self.graph
            .push(Operation::Input(spec.clone()), Vec::new(), spec, None)
    }

    /// Records a constant source node; its value is available immediately
    /// for downstream folding.
    pub fn constant(&mut self, tensor: Tensor) -> NodeId {
        let output = tensor.spec().clone();
        let value = Some(tensor.clone());
        self.graph
            .push(Operation::Constant(tensor), Vec::new(), output, value)
    }

    /// `x [.., in] x weight [out, in] (+ bias [out]) -> [.., out]`.
    ///
    /// When `bias` is omitted and `out_channels` is concrete, a zero bias of
    /// the promoted dtype is synthesized and recorded as a value operand.
    pub fn linear(
        &mut self,
        x: impl Into<OperandSource>,
        weight: impl Into<OperandSource>,
        bias: Option<OperandSource>,
    ) -> OpResult<NodeId> {
        let mut resolved = vec![
            self.resolve("linear", x.into())?,
            self.resolve("linear", weight.into())?,
        ];
        match bias {
            Some(bias) => resolved.push(self.resolve("linear", bias)?),
            None => {
                if let Some(bias) = ops::default_bias(&resolved[0].spec, &resolved[1].spec)? {
                    resolved.push(Resolved {
                        spec: bias.spec().clone(),
                        operand: Operand::Value(bias),
                    });
                }
            }
        }
        self.emit(Operation::Linear, resolved)
    }

    pub fn matmul(
        &mut self,
        x: impl Into<OperandSource>,
        y: impl Into<OperandSource>,
        transpose_x: bool,
        transpose_y: bool,
    ) -> OpResult<NodeId> {
        let resolved = vec![
            self.resolve("matmul", x.into())?,
            self.resolve("matmul", y.into())?,
        ];
        self.emit(
            Operation::MatMul(MatMulSpec {
                transpose_x,
                transpose_y,
            }),
            resolved,
        )
    }

    pub fn einsum(
        &mut self,
        equation: &str,
        x: impl Into<OperandSource>,
        y: impl Into<OperandSource>,
    ) -> OpResult<NodeId> {
        let resolved = vec![
            self.resolve("einsum", x.into())?,
            self.resolve("einsum", y.into())?,
        ];
        self.emit(
            Operation::Einsum(EinsumSpec {
                equation: equation.to_string(),
            }),
            resolved,
        )
    }

    pub fn conv(
        &mut self,
        x: impl Into<OperandSource>,
        weight: impl Into<OperandSource>,
        spec: ConvSpec,
    ) -> OpResult<NodeId> {
        let resolved = vec![
            self.resolve("conv", x.into())?,
            self.resolve("conv", weight.into())?,
        ];
        self.emit(Operation::Conv(spec), resolved)
    }

    pub fn transpose(&mut self, x: impl Into<OperandSource>, perm: &[usize]) -> OpResult<NodeId> {
        let resolved = vec![self.resolve("transpose", x.into())?];
        self.emit(
            Operation::Transpose(TransposeSpec {
                perm: perm.to_vec(),
            }),
            resolved,
        )
    }

    pub fn cast(&mut self, x: impl Into<OperandSource>, dtype: DType) -> OpResult<NodeId> {
        let resolved = vec![self.resolve("cast", x.into())?];
        self.emit(Operation::Cast(CastSpec { dtype }), resolved)
    }

    fn resolve(&self, op: &'static str, source: OperandSource) -> OpResult<Resolved> {
        match source {
            OperandSource::Tensor(tensor) => Ok(Resolved {
                spec: tensor.spec().clone(),
                operand: Operand::Value(tensor),
            }),
            OperandSource::Node(id) => {
                let Some(node) = self.graph.node(id) else {
                    return Err(OpError::unsupported(
                        op,
                        format!("operand references unknown node {}", id.0),
                    ));
                };
                Ok(Resolved {
                    spec: node.output.clone(),
                    operand: Operand::Node(id),
                })
            }
        }
    }

    fn emit(&mut self, op: Operation, resolved: Vec<Resolved>) -> OpResult<NodeId> {
        let input_specs: Vec<TensorSpec> = resolved.iter().map(|r| r.spec.clone()).collect();
        let output = ops::validate_and_infer(&op, &input_specs)?;
        let operands: Vec<Operand> = resolved.into_iter().map(|r| r.operand).collect();
        let value = self.try_fold(&op, &operands)?;
        Ok(self.graph.push(op, operands, output, value))
    }

    /// Folds when every operand resolves to a value, picking up folded
    /// upstream nodes for constant propagation.
    fn try_fold(&self, op: &Operation, operands: &[Operand]) -> OpResult<Option<Tensor>> {
        let mut values = Vec::with_capacity(operands.len());
        for operand in operands {
            let value = match operand {
                Operand::Value(tensor) => tensor.clone(),
                Operand::Node(id) => match self.graph.folded_value(*id) {
                    Some(tensor) => tensor.clone(),
                    None => return Ok(None),
                },
            };
            values.push(value);
        }
        eval::fold(op, &values)
    }
}
