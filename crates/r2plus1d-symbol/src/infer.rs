use log::trace;
use r2plus1d_core::{GraphError, GraphResult, Shape};

use crate::graph::{Graph, Node};
use crate::op::{Op, ParamKind};

impl Graph {
    /// Infer every node's shape from named input shapes.
    ///
    /// Placeholders not listed keep their declared shape (possibly unknown).
    /// Returns one entry per node, in node order.
    pub fn infer_shapes(&self, inputs: &[(&str, Shape)]) -> GraphResult<Vec<Option<Shape>>> {
        for (name, _) in inputs {
            let known = self
                .find(name)
                .and_then(|id| self.get(id).ok())
                .is_some_and(Node::is_variable);
            if !known {
                return Err(GraphError::UnknownInput(name.to_string()));
            }
        }

        let mut shapes: Vec<Option<Shape>> = Vec::with_capacity(self.len());
        for node in self.nodes() {
            let shape = match &node.op {
                Op::Variable { shape, .. } => inputs
                    .iter()
                    .find(|(name, _)| *name == node.name)
                    .map(|(_, s)| s.clone())
                    .or_else(|| shape.clone()),
                op => {
                    let input_shapes: Vec<Option<&Shape>> =
                        node.inputs.iter().map(|id| shapes[id.0].as_ref()).collect();
                    op.infer_shape(&node.name, &input_shapes)?
                }
            };
            trace!("infer {} -> {:?}", node.name, shape);
            shapes.push(shape);
        }
        Ok(shapes)
    }

    /// A copy of this graph with shapes inferred from `inputs`.
    pub fn with_input_shapes(&self, inputs: &[(&str, Shape)]) -> GraphResult<Graph> {
        let shapes = self.infer_shapes(inputs)?;
        let nodes = self
            .nodes()
            .iter()
            .cloned()
            .zip(shapes)
            .map(|(mut node, shape)| {
                if let Op::Variable { shape: declared, .. } = &mut node.op {
                    *declared = shape.clone();
                }
                node.shape = shape;
                node
            })
            .collect();
        Graph::from_nodes(nodes)
    }

    /// Number of learnable scalars. Requires every argument shape to be known.
    pub fn parameter_count(&self) -> GraphResult<usize> {
        let mut total = 0;
        for param in self.list_parameters() {
            if param.kind != ParamKind::Arg {
                continue;
            }
            match param.shape {
                Some(shape) => total += shape.numel(),
                None => {
                    return Err(GraphError::InvalidShape {
                        op: param.name,
                        reason: "shape not inferred; bind input shapes first".to_string(),
                    })
                }
            }
        }
        Ok(total)
    }
}
