// dot.rs — Graphviz rendering of a graph
//
// Deterministic output (id order) so renders are diffable and usable in
// snapshot tests.

use std::fmt::Write;

use crate::graph::Graph;

/// Render `graph` as a Graphviz digraph.
pub fn emit_dot(graph: &Graph) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", graph.name());
    let _ = writeln!(out, "  rankdir=BT;");
    let _ = writeln!(out, "  node [shape=box, fontname=\"monospace\"];");

    for (id, node) in graph.iter() {
        let label = node.kind.describe();
        let shape = if node.is_call_target() || node.is_invoke() {
            ", style=rounded"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "  {id} [label=\"{id}: {label}\\n{}\"{shape}];",
            node.stamp()
        );
    }
    for (id, node) in graph.iter() {
        for (i, input) in node.inputs.iter().enumerate() {
            let _ = writeln!(out, "  {input} -> {id} [taillabel=\"{i}\"];");
        }
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BinOp, ConstValue, Node};
    use crate::stamp::Stamp;

    #[test]
    fn renders_nodes_and_edges() {
        let mut g = Graph::new("demo");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        let b = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        let sum = g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        g.add(Node::ret(Some(sum))).unwrap();

        let dot = emit_dot(&g);
        assert!(dot.starts_with("digraph \"demo\""));
        assert!(dot.contains("n0 -> n2"));
        assert!(dot.contains("n1 -> n2"));
        assert!(dot.ends_with("}\n"));
    }

    #[test]
    fn render_is_deterministic() {
        let mut g = Graph::new("demo");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        g.add(Node::ret(Some(a))).unwrap();
        assert_eq!(emit_dot(&g), emit_dot(&g));
    }
}
