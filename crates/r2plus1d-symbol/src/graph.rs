use std::collections::{HashMap, HashSet};

use log::debug;
use r2plus1d_core::{GraphError, GraphResult, Shape};
use serde::{Deserialize, Serialize};

use crate::op::{Op, ParamSpec};

/// Unique identifier for a node in the computation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A node in the computation graph. Never modified after it is pushed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub op: Op,
    pub inputs: Vec<NodeId>,
    /// Output shape, once all the shapes it depends on are known.
    pub shape: Option<Shape>,
}

impl Node {
    pub fn is_variable(&self) -> bool {
        matches!(self.op, Op::Variable { .. })
    }
}

/// Serialized form of a [`Graph`]: just the node list.
#[derive(Debug, Serialize, Deserialize)]
pub struct GraphDef {
    pub nodes: Vec<Node>,
}

/// The computation graph — append-only arena of nodes.
///
/// Inputs always point at earlier nodes, so arena order is a topological
/// order and the graph cannot contain cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "GraphDef", into = "GraphDef")]
pub struct Graph {
    nodes: Vec<Node>,
    names: HashSet<String>,
    auto_names: HashMap<&'static str, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Rebuild a graph from a node list, checking ids, names and input order.
    pub fn from_nodes(nodes: Vec<Node>) -> GraphResult<Self> {
        let mut graph = Graph::new();
        for (index, node) in nodes.into_iter().enumerate() {
            if node.id.0 != index {
                return Err(GraphError::UnknownNode {
                    id: node.id.0,
                    len: index,
                });
            }
            graph.check_inputs(&node.inputs)?;
            if !graph.names.insert(node.name.clone()) {
                return Err(GraphError::DuplicateName(node.name));
            }
            graph.nodes.push(node);
        }
        Ok(graph)
    }

    /// Append a node and return its id.
    ///
    /// A `None` name is replaced by the op's prefix and a counter
    /// (`activation0`, `_plus3`, ...). The output shape is inferred when the
    /// input shapes allow it.
    pub fn add_node(&mut self, op: Op, inputs: Vec<NodeId>, name: Option<&str>) -> GraphResult<NodeId> {
        self.check_inputs(&inputs)?;

        let name = match name {
            Some(n) if self.names.contains(n) => return Err(GraphError::DuplicateName(n.to_string())),
            Some(n) => n.to_string(),
            None => self.next_auto_name(op.name_prefix()),
        };

        let input_shapes: Vec<Option<&Shape>> =
            inputs.iter().map(|id| self.nodes[id.0].shape.as_ref()).collect();
        let shape = op.infer_shape(&name, &input_shapes)?;

        let id = NodeId(self.nodes.len());
        debug!(
            "node {} '{}' {} -> {}",
            id,
            name,
            op.summary(),
            shape.as_ref().map_or_else(|| "?".to_string(), |s| s.to_string())
        );
        self.names.insert(name.clone());
        self.nodes.push(Node {
            id,
            name,
            op,
            inputs,
            shape,
        });
        Ok(id)
    }

    fn check_inputs(&self, inputs: &[NodeId]) -> GraphResult<()> {
        match inputs.iter().find(|id| id.0 >= self.nodes.len()) {
            Some(bad) => Err(GraphError::UnknownNode {
                id: bad.0,
                len: self.nodes.len(),
            }),
            None => Ok(()),
        }
    }

    fn next_auto_name(&mut self, prefix: &'static str) -> String {
        let counter = self.auto_names.entry(prefix).or_insert(0);
        loop {
            let candidate = format!("{}{}", prefix, counter);
            *counter += 1;
            if !self.names.contains(&candidate) {
                return candidate;
            }
        }
    }

    pub fn get(&self, id: NodeId) -> GraphResult<&Node> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode {
            id: id.0,
            len: self.nodes.len(),
        })
    }

    /// Output shape of a node, if inferred.
    pub fn shape(&self, id: NodeId) -> GraphResult<Option<&Shape>> {
        Ok(self.get(id)?.shape.as_ref())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in creation order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.name == name).map(|n| n.id)
    }

    /// Placeholder nodes, in creation order.
    pub fn variables(&self) -> Vec<&Node> {
        self.nodes.iter().filter(|n| n.is_variable()).collect()
    }

    /// Every node `output` depends on, in topological order, ending with `output`.
    pub fn reachable(&self, output: NodeId) -> GraphResult<Vec<NodeId>> {
        self.get(output)?;
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![output];
        while let Some(id) = stack.pop() {
            if seen[id.0] {
                continue;
            }
            seen[id.0] = true;
            stack.extend(self.nodes[id.0].inputs.iter().copied());
        }
        // arena order is topological
        Ok(seen
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| NodeId(i))
            .collect())
    }

    /// Implicit parameters of every node, in creation order.
    pub fn list_parameters(&self) -> Vec<ParamSpec> {
        self.nodes
            .iter()
            .flat_map(|node| {
                let input = node
                    .inputs
                    .first()
                    .and_then(|id| self.nodes[id.0].shape.as_ref());
                node.op.parameters(&node.name, input)
            })
            .collect()
    }
}

impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl TryFrom<GraphDef> for Graph {
    type Error = GraphError;

    fn try_from(def: GraphDef) -> GraphResult<Self> {
        Graph::from_nodes(def.nodes)
    }
}

impl From<Graph> for GraphDef {
    fn from(graph: Graph) -> Self {
        GraphDef { nodes: graph.nodes }
    }
}
