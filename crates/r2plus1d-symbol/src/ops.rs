//! Node constructors. Each call appends exactly one node and returns its id;
//! the inputs are never modified.

use r2plus1d_core::{DType, GraphResult, Shape};

use crate::graph::{Graph, NodeId};
use crate::op::{ActType, BatchNormParams, ConvParams, Op, PoolParams, SoftmaxParams};

impl Graph {
    /// Declare a placeholder whose shape is supplied later.
    pub fn variable(&mut self, name: &str, dtype: DType) -> GraphResult<NodeId> {
        self.add_node(Op::Variable { dtype, shape: None }, vec![], Some(name))
    }

    /// Declare a placeholder with a known shape.
    pub fn variable_with_shape(&mut self, name: &str, dtype: DType, shape: Shape) -> GraphResult<NodeId> {
        self.add_node(
            Op::Variable {
                dtype,
                shape: Some(shape),
            },
            vec![],
            Some(name),
        )
    }

    pub fn convolution(&mut self, data: NodeId, params: ConvParams, name: &str) -> GraphResult<NodeId> {
        self.add_node(Op::Convolution(params), vec![data], Some(name))
    }

    pub fn batch_norm(&mut self, data: NodeId, params: BatchNormParams, name: &str) -> GraphResult<NodeId> {
        self.add_node(Op::BatchNorm(params), vec![data], Some(name))
    }

    /// Activation with a generated name.
    pub fn activation(&mut self, data: NodeId, act_type: ActType) -> GraphResult<NodeId> {
        self.add_node(Op::Activation { act_type }, vec![data], None)
    }

    pub fn relu(&mut self, data: NodeId) -> GraphResult<NodeId> {
        self.activation(data, ActType::Relu)
    }

    /// `lhs + rhs`, with a generated name.
    pub fn elemwise_add(&mut self, lhs: NodeId, rhs: NodeId) -> GraphResult<NodeId> {
        self.add_node(Op::ElemwiseAdd, vec![lhs, rhs], None)
    }

    pub fn pooling(&mut self, data: NodeId, params: PoolParams, name: &str) -> GraphResult<NodeId> {
        self.add_node(Op::Pooling(params), vec![data], Some(name))
    }

    /// Dense layer over the input flattened to `(batch, features)`.
    pub fn fully_connected(
        &mut self,
        data: NodeId,
        num_hidden: usize,
        no_bias: bool,
        name: &str,
    ) -> GraphResult<NodeId> {
        self.add_node(Op::FullyConnected { num_hidden, no_bias }, vec![data], Some(name))
    }

    pub fn softmax_output(
        &mut self,
        data: NodeId,
        label: NodeId,
        params: SoftmaxParams,
        name: &str,
    ) -> GraphResult<NodeId> {
        self.add_node(Op::SoftmaxOutput(params), vec![data, label], Some(name))
    }
}
