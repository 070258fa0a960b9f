// canonicalize.rs — Worklist canonicalization to a fixed point
//
// Repeatedly re-infers stamps and applies local rewrite rules until no node
// changes. Progress is strict: a step either narrows a stamp or deletes a
// node, so the fixed point is reached in a bounded number of steps. A step
// budget backstops the strictness check; exceeding it means a rewrite rule
// broke the progress contract.
//
// Preconditions: graph inputs/uses are consistent (maintained by graph.rs).
// Postconditions: no node has a narrower inferable stamp or a pending
//                 canonical rewrite.
// Failure modes: a widening inference → WidenedStamp; runaway rewrites →
//                NonTerminatingCanonicalization.

use std::collections::VecDeque;

use crate::error::{Error, GraphInternalError};
use crate::graph::{Graph, NodeId};
use crate::node::{canonical, infer_stamp, Canonical, Node};
use crate::phase::{Phase, PhaseContext};
use crate::registry::TypeTable;

/// Steps allowed per live node before declaring non-termination. Generous:
/// each node can narrow its stamp only a small constant number of times.
const STEPS_PER_NODE: usize = 20;

/// Run canonicalization to a fixed point over the whole graph.
pub fn canonicalize(graph: &mut Graph, types: &TypeTable) -> Result<(), GraphInternalError> {
    let mut worklist: VecDeque<NodeId> = graph.ids().into();
    let limit = STEPS_PER_NODE * graph.live_count() + 100;
    let mut steps = 0usize;

    while let Some(id) = worklist.pop_front() {
        if !graph.is_live(id) {
            continue;
        }
        steps += 1;
        if steps > limit {
            return Err(GraphInternalError::NonTerminatingCanonicalization { limit });
        }

        if let Some(new) = infer_stamp(graph, types, id) {
            let old = graph[id].stamp().clone();
            // Inference must only narrow: re-intersecting with the old
            // stamp must leave the new one unchanged.
            if new.join(&old) != new {
                return Err(GraphInternalError::WidenedStamp { node: id });
            }
            graph.node_mut(id).stamp = new;
            // A narrowed output can unlock users and this node's own rules.
            worklist.extend(graph.uses(id).iter().copied());
        }

        match canonical(graph, id) {
            Canonical::Unchanged => {}
            Canonical::Replace(replacement) => {
                graph.replace_and_delete(id, replacement)?;
                worklist.push_back(replacement);
                worklist.extend(graph.uses(replacement).iter().copied());
            }
            Canonical::Fold(value) => {
                let constant = graph.add(Node::constant(value))?;
                graph.replace_and_delete(id, constant)?;
                worklist.extend(graph.uses(constant).iter().copied());
            }
        }
    }
    Ok(())
}

/// Canonicalization as a pipeline phase.
#[derive(Debug, Default)]
pub struct CanonicalizerPhase;

impl Phase for CanonicalizerPhase {
    fn name(&self) -> &'static str {
        "canonicalize"
    }

    fn apply(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        canonicalize(graph, cx.registry.types())?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
