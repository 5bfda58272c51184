use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::Operation;
use crate::spec::TensorSpec;
use crate::tensor::Tensor;

/// Unique identifier for graph nodes, allocated in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Operand reference recorded on a node: an inline constant or the output
/// of an upstream node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(Tensor),
    Node(NodeId),
}

/// Immutable graph node: operator identity, resolved operands, inferred
/// output spec, and the folded value when every operand was constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub op: Operation,
    pub operands: Vec<Operand>,
    pub output: TensorSpec,
    pub value: Option<Tensor>,
}

#[derive(Debug, Error)]
pub enum GraphSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Append-only computation graph. Nodes are immutable once pushed and refer
/// to earlier nodes only, so the node list is always a topological order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    nodes: Vec<GraphNode>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Output spec of a node, if it exists.
    pub fn output_spec(&self, id: NodeId) -> Option<&TensorSpec> {
        self.node(id).map(|node| &node.output)
    }

    /// Folded value of a node, if it exists and was constant.
    pub fn folded_value(&self, id: NodeId) -> Option<&Tensor> {
        self.node(id).and_then(|node| node.value.as_ref())
    }

    pub(crate) fn push(
        &mut self,
        op: Operation,
        operands: Vec<Operand>,
        output: TensorSpec,
        value: Option<Tensor>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(GraphNode {
            id,
            op,
            operands,
            output,
            value,
        });
        id
    }

    pub fn to_json_string(&self) -> Result<String, GraphSerdeError> {
        serde_json::to_string_pretty(self).map_err(GraphSerdeError::from)
    }

    pub fn from_json_str(src: &str) -> Result<Self, GraphSerdeError> {
        serde_json::from_str(src).map_err(GraphSerdeError::from)
    }
}
