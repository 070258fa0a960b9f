// dce.rs — Dead-code elimination
//
// Mark-and-sweep over data inputs. Roots are the nodes whose execution is
// observable: returns, exits, and anything flagged with a live side effect.
// Everything unreachable from a root is deleted, users before inputs so no
// delete ever sees a remaining use.
//
// Postconditions: every surviving node is reachable from a root.

use crate::error::{Error, GraphInternalError};
use crate::graph::{Graph, NodeId};
use crate::node::{NodeFlags, NodeKind};
use crate::phase::{Phase, PhaseContext};

/// Delete every node not reachable from an observable root. Returns the
/// number of nodes removed.
pub fn eliminate_dead_nodes(graph: &mut Graph) -> Result<usize, GraphInternalError> {
    let mut stack: Vec<NodeId> = Vec::new();
    for (id, node) in graph.iter() {
        let is_root = node.has_live_side_effect()
            || matches!(
                node.kind,
                NodeKind::Return | NodeKind::StateAfterPlaceholder
            );
        if is_root {
            stack.push(id);
        }
    }

    while let Some(id) = stack.pop() {
        if graph[id].flags.contains(NodeFlags::MARKED) {
            continue;
        }
        graph.node_mut(id).flags |= NodeFlags::MARKED;
        stack.extend(graph[id].inputs.iter().copied());
    }

    // Sweep users before inputs. Rewrites can leave a user with a smaller
    // id than its input, so id order is no guide; instead delete whatever
    // currently has no uses until the dead set is drained. Marking
    // propagates user-to-input, so a dead node only ever has dead users.
    let mut removed = 0usize;
    let mut pending = Vec::new();
    for id in graph.ids() {
        if graph[id].flags.contains(NodeFlags::MARKED) {
            graph.node_mut(id).flags -= NodeFlags::MARKED;
        } else {
            pending.push(id);
        }
    }
    while !pending.is_empty() {
        let before = removed;
        let mut stuck = Vec::new();
        for id in pending.drain(..) {
            if graph.uses(id).is_empty() {
                graph.delete(id)?;
                removed += 1;
            } else {
                stuck.push(id);
            }
        }
        if removed == before && !stuck.is_empty() {
            return Err(GraphInternalError::Malformed(
                "dead nodes form an input cycle".into(),
            ));
        }
        pending = stuck;
    }
    Ok(removed)
}

/// Dead-code elimination as a pipeline phase.
#[derive(Debug, Default)]
pub struct DeadCodeEliminationPhase;

impl Phase for DeadCodeEliminationPhase {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn apply(&self, graph: &mut Graph, _cx: &PhaseContext) -> Result<(), Error> {
        eliminate_dead_nodes(graph)?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BinOp, ConstValue, Node};
    use crate::stamp::Stamp;

    #[test]
    fn removes_unreachable_chain() {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        let b = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        let dead = g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        let live = g.add(Node::constant(ConstValue::Int(3))).unwrap();
        g.add(Node::ret(Some(live))).unwrap();

        let removed = eliminate_dead_nodes(&mut g).unwrap();
        assert_eq!(removed, 3);
        assert!(!g.is_live(dead));
        assert!(!g.is_live(a));
        assert!(g.is_live(live));
    }

    #[test]
    fn side_effect_roots_keep_their_inputs() {
        let mut g = Graph::new("t");
        let v = g.add(Node::constant(ConstValue::Int(7))).unwrap();
        let probe = g.add(Node::instrument("probe", v)).unwrap();
        g.add(Node::ret(None)).unwrap();

        let removed = eliminate_dead_nodes(&mut g).unwrap();
        assert_eq!(removed, 0);
        assert!(g.is_live(probe));
        assert!(g.is_live(v));
    }

    #[test]
    fn repeat_run_is_a_no_op() {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        g.add(Node::ret(Some(a))).unwrap();
        let dead = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        let _ = dead;

        assert_eq!(eliminate_dead_nodes(&mut g).unwrap(), 1);
        assert_eq!(eliminate_dead_nodes(&mut g).unwrap(), 0);
    }
}
