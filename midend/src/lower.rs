// lower.rs — Lowers self-replacing call targets
//
// A self-replacing call target stands in for a call that must be redirected
// to a replacement method before code generation. Lowering swaps each one
// for a plain call target against the replacement, exactly once: the
// dispatch kind follows the replacement's staticness, the replacement
// argument slice becomes the argument list, and the invoke's result stamp
// becomes the replacement's return stamp. Reaching code generation with one
// still in the graph is a fatal internal error.

use crate::error::{Error, GraphInternalError};
use crate::graph::{Graph, NodeId};
use crate::node::{InvokeKind, Node, NodeKind, NodeVisitor};
use crate::phase::{Phase, PhaseContext};
use crate::registry::MethodRegistry;

/// Lower every self-replacing call target. Returns the number lowered.
pub fn lower_self_replacing_targets(
    graph: &mut Graph,
    registry: &MethodRegistry,
) -> Result<usize, GraphInternalError> {
    let mut lowered = 0usize;
    let targets =
        graph.nodes_matching(|k| matches!(k, NodeKind::SelfReplacingCallTarget { .. }));
    for target in targets {
        if !graph.is_live(target) {
            continue;
        }
        let node = &graph[target];
        let NodeKind::SelfReplacingCallTarget {
            replacement_method,
            ref replacement_return,
            ..
        } = node.kind
        else {
            continue;
        };
        let invoke_kind = if registry.method(replacement_method).modifiers.is_static {
            InvokeKind::Static
        } else {
            InvokeKind::Special
        };
        let args = node.replacement_args().to_vec();
        let return_stamp = replacement_return.clone();
        let users: Vec<NodeId> = graph.uses(target).to_vec();

        let replacement = graph.add(Node::call_target(invoke_kind, replacement_method, args))?;
        graph.replace_and_delete(target, replacement)?;
        for user in users {
            if graph.is_live(user) && graph[user].is_invoke() {
                graph.node_mut(user).stamp = return_stamp.clone();
            }
        }
        lowered += 1;
    }
    Ok(lowered)
}

/// Lowering as a pipeline phase.
#[derive(Debug, Default)]
pub struct LoweringPhase;

impl Phase for LoweringPhase {
    fn name(&self) -> &'static str {
        "lower"
    }

    fn apply(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        lower_self_replacing_targets(graph, cx.registry)?;
        Ok(())
    }
}

// ── Emission readiness ──────────────────────────────────────────────────────

struct EmitCheck {
    error: Option<GraphInternalError>,
}

impl NodeVisitor for EmitCheck {
    // Call targets and Pi nodes produce no code of their own.
    fn visit_self_replacing_call_target(&mut self, id: NodeId, _node: &Node) {
        if self.error.is_none() {
            self.error = Some(GraphInternalError::ShouldNotReachHere(format!(
                "self-replacing call target {id} reached code generation; \
                 it should have replaced itself during lowering"
            )));
        }
    }
}

/// Code generation's entry check: every node must be emittable. The only
/// node that can never be emitted is an unlowered self-replacing target.
pub fn check_emittable(graph: &Graph) -> Result<(), GraphInternalError> {
    let mut check = EmitCheck { error: None };
    for (id, node) in graph.iter() {
        node.accept(id, &mut check);
        if let Some(error) = check.error.take() {
            return Err(error);
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ConstValue;
    use crate::registry::{MethodBody, MethodId, MethodMeta, Modifiers};
    use crate::stamp::Stamp;

    fn registry_with_replacement(is_static: bool) -> (MethodRegistry, MethodId, MethodId) {
        let mut reg = MethodRegistry::new();
        let class = reg.add_class("rt.Math", None).unwrap();
        let mut add = |name: &str, is_static: bool| {
            reg.add_method(
                class,
                MethodMeta {
                    name: name.into(),
                    class,
                    modifiers: Modifiers {
                        is_static,
                        ..Default::default()
                    },
                    params: vec![Stamp::int()],
                    return_stamp: Stamp::int(),
                    snippet: None,
                    substitution: None,
                    macro_subst: None,
                    intrinsic: None,
                    body: Some(MethodBody::default()),
                },
            )
            .unwrap()
        };
        let original = add("slow", true);
        let replacement = add("fast", is_static);
        (reg, original, replacement)
    }

    fn graph_with_self_replacing(
        original: MethodId,
        replacement: MethodId,
    ) -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        let b = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        let target = g
            .add(Node::self_replacing_call_target(
                InvokeKind::Static,
                original,
                vec![a],
                replacement,
                vec![b],
                Stamp::long(),
            ))
            .unwrap();
        let invoke = g.add(Node::invoke(target, Stamp::int())).unwrap();
        g.add(Node::ret(Some(invoke))).unwrap();
        (g, target, invoke)
    }

    #[test]
    fn lowers_to_static_target_with_replacement_args() {
        let (reg, original, replacement) = registry_with_replacement(true);
        let (mut g, target, invoke) = graph_with_self_replacing(original, replacement);

        assert_eq!(lower_self_replacing_targets(&mut g, &reg).unwrap(), 1);
        assert!(!g.is_live(target));

        let new_target = g[invoke].invoke_target().unwrap();
        let (kind, method) = g[new_target].target_method().unwrap();
        assert_eq!(kind, InvokeKind::Static);
        assert_eq!(method, replacement);
        // Replacement argument b, not the original argument a.
        assert_eq!(g[new_target].target_args(), &[crate::graph::NodeId(1)]);
        assert_eq!(g[invoke].stamp(), &Stamp::long());
    }

    #[test]
    fn non_static_replacement_lowers_to_special() {
        let (reg, original, replacement) = registry_with_replacement(false);
        let (mut g, _, invoke) = graph_with_self_replacing(original, replacement);
        lower_self_replacing_targets(&mut g, &reg).unwrap();
        let new_target = g[invoke].invoke_target().unwrap();
        assert_eq!(
            g[new_target].target_method().unwrap().0,
            InvokeKind::Special
        );
    }

    #[test]
    fn lowering_is_idempotent() {
        let (reg, original, replacement) = registry_with_replacement(true);
        let (mut g, _, _) = graph_with_self_replacing(original, replacement);
        assert_eq!(lower_self_replacing_targets(&mut g, &reg).unwrap(), 1);
        assert_eq!(lower_self_replacing_targets(&mut g, &reg).unwrap(), 0);
        check_emittable(&g).unwrap();
    }

    #[test]
    fn unlowered_target_fails_emission_check() {
        let (_, original, replacement) = registry_with_replacement(true);
        let (g, _, _) = graph_with_self_replacing(original, replacement);
        let err = check_emittable(&g).unwrap_err();
        match err {
            GraphInternalError::ShouldNotReachHere(msg) => {
                assert!(msg.contains("should have replaced itself"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
