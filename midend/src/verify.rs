// verify.rs — Structural graph verification
//
// Checks the shape invariants that every pass relies on: input arities per
// kind, invoke targets that are actually call targets, live inputs, and no
// node left with an unsatisfiable stamp. Run after graph construction and at
// pipeline boundaries; a failure means an earlier pass emitted garbage.
//
// Failure modes: any violation → GraphInternalError::Malformed.

use crate::error::{Error, GraphInternalError};
use crate::graph::{Graph, NodeId};
use crate::node::{Node, NodeKind};
use crate::phase::{Phase, PhaseContext};

/// Verify the structural invariants of `graph`.
pub fn verify(graph: &Graph) -> Result<(), GraphInternalError> {
    for (id, node) in graph.iter() {
        for &input in &node.inputs {
            if !graph.is_live(input) {
                return Err(malformed(id, node, "reads a deleted node"));
            }
        }
        check_arity(graph, id, node)?;
        if node.stamp().is_illegal() {
            return Err(malformed(id, node, "carries an unsatisfiable stamp"));
        }
    }
    Ok(())
}

fn check_arity(graph: &Graph, id: NodeId, node: &Node) -> Result<(), GraphInternalError> {
    let n = node.inputs.len();
    let ok = match &node.kind {
        NodeKind::Param { .. } | NodeKind::Const { .. } => n == 0,
        NodeKind::Binary { .. } => n == 2,
        NodeKind::LoadIndexed { .. } => n == 3,
        NodeKind::ArrayLength
        | NodeKind::Guard
        | NodeKind::Instrument { .. }
        | NodeKind::Throw => n == 1,
        NodeKind::Pi { has_guard, .. } => n == if *has_guard { 2 } else { 1 },
        NodeKind::CallTarget { .. } | NodeKind::FrameState => true,
        NodeKind::SelfReplacingCallTarget { arg_count, .. } => n >= *arg_count,
        NodeKind::Invoke { has_state } => {
            let arity_ok = n == if *has_state { 2 } else { 1 };
            arity_ok && graph[node.inputs[0]].is_call_target()
        }
        NodeKind::StateAfterPlaceholder => n == 1 && graph[node.inputs[0]].is_invoke(),
        NodeKind::Phi => n >= 1,
        NodeKind::Return => n <= 1,
    };
    if ok {
        Ok(())
    } else {
        Err(malformed(id, node, "has ill-formed inputs"))
    }
}

fn malformed(id: NodeId, node: &Node, what: &str) -> GraphInternalError {
    GraphInternalError::Malformed(format!("{} node {id} {what}", node.kind.name()))
}

/// Verification as a pipeline phase.
#[derive(Debug, Default)]
pub struct VerifyPhase;

impl Phase for VerifyPhase {
    fn name(&self) -> &'static str {
        "verify"
    }

    fn apply(&self, graph: &mut Graph, _cx: &PhaseContext) -> Result<(), Error> {
        verify(graph)?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BinOp, ConstValue, InvokeKind};
    use crate::registry::MethodId;
    use crate::stamp::Stamp;

    #[test]
    fn well_formed_graph_passes() {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        let b = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        let sum = g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        let target = g
            .add(Node::call_target(InvokeKind::Static, MethodId(0), vec![sum]))
            .unwrap();
        g.add(Node::invoke(target, Stamp::void())).unwrap();
        g.add(Node::ret(None)).unwrap();
        verify(&g).unwrap();
    }

    #[test]
    fn invoke_of_non_target_is_rejected() {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        g.add(Node::invoke(a, Stamp::void())).unwrap();
        assert!(matches!(
            verify(&g),
            Err(GraphInternalError::Malformed(_))
        ));
    }

    #[test]
    fn illegal_stamp_is_rejected() {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        g.node_mut(a).stamp = Stamp::illegal();
        assert!(verify(&g).is_err());
    }
}
