use crate::graph::Graph;
use crate::op::Op;

impl Graph {
    /// Render the graph as a Graphviz `digraph`, one vertex per node.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph network {\n    rankdir=BT;\n");
        for node in self.nodes() {
            let (shape, color) = match node.op {
                Op::Variable { .. } => ("oval", "#8dd3c7"),
                Op::Convolution(_) => ("box", "#fb8072"),
                Op::BatchNorm(_) => ("box", "#bebada"),
                Op::Activation { .. } => ("box", "#ffffb3"),
                Op::ElemwiseAdd => ("box", "#fccde5"),
                Op::Pooling(_) => ("box", "#80b1d3"),
                Op::FullyConnected { .. } | Op::SoftmaxOutput(_) => ("box", "#fdb462"),
            };
            let mut label = format!("{}\\n{}", escape(&node.name), escape(&node.op.summary()));
            if let Some(s) = &node.shape {
                label.push_str(&format!("\\n{}", s));
            }
            out.push_str(&format!(
                "    n{} [label=\"{}\", shape={}, style=filled, fillcolor=\"{}\"];\n",
                node.id.0, label, shape, color
            ));
        }
        for node in self.nodes() {
            for input in &node.inputs {
                out.push_str(&format!("    n{} -> n{};\n", input.0, node.id.0));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
