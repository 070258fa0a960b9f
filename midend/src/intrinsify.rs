// intrinsify.rs — Rewrites calls of intrinsic-marked methods into nodes
//
// A method carrying an intrinsic marker never gets called: its invokes are
// replaced by the dedicated node kind the marker names. Markers that demand
// constant arguments are honored only by the constant-parameter-aware run,
// which the installer schedules right before finalization, after folding
// has had every chance to make the arguments constant.

use crate::error::{Error, GraphInternalError};
use crate::graph::Graph;
use crate::node::Node;
use crate::phase::{Phase, PhaseContext};
use crate::registry::{IntrinsicOp, MethodRegistry};

/// Rewrite every eligible invoke. Returns the number of calls replaced.
pub fn intrinsify(
    graph: &mut Graph,
    registry: &MethodRegistry,
    constant_aware: bool,
) -> Result<usize, GraphInternalError> {
    let mut replaced = 0usize;
    for invoke in graph.invokes() {
        if !graph.is_live(invoke) {
            continue;
        }
        let target = match graph[invoke].invoke_target() {
            Some(t) => t,
            None => continue,
        };
        let Some((_, method)) = graph[target].target_method() else {
            continue;
        };
        let Some(marker) = registry.method(method).intrinsic else {
            continue;
        };
        let args = graph[target].target_args().to_vec();
        if marker.requires_const_args {
            let all_const = args.iter().all(|&a| graph[a].is_const());
            if !(constant_aware && all_const) {
                continue;
            }
        }

        let node = match marker.op {
            IntrinsicOp::ArrayLength => {
                let [array] = args.as_slice() else {
                    return Err(arity_error(registry, method, "array_length", 1, args.len()));
                };
                Node::array_length(*array)
            }
            IntrinsicOp::LoadIndexed { elem } => {
                let [array, index, length] = args.as_slice() else {
                    return Err(arity_error(registry, method, "load_indexed", 3, args.len()));
                };
                Node::load_indexed(*array, *index, *length, elem)
            }
        };
        let state = graph[invoke].invoke_state();
        let replacement = graph.add(node)?;
        graph.replace_and_delete(invoke, replacement)?;
        if graph.uses(target).is_empty() {
            graph.delete(target)?;
        }
        if let Some(state) = state {
            if graph.is_live(state) && graph.uses(state).is_empty() {
                graph.delete(state)?;
            }
        }
        replaced += 1;
    }
    Ok(replaced)
}

fn arity_error(
    registry: &MethodRegistry,
    method: crate::registry::MethodId,
    op: &str,
    want: usize,
    got: usize,
) -> GraphInternalError {
    GraphInternalError::Malformed(format!(
        "intrinsic {op} on '{}' needs {want} arguments, call passes {got}",
        registry.qualified_name(method)
    ))
}

/// Intrinsification as a pipeline phase.
#[derive(Debug, Default)]
pub struct IntrinsifyPhase {
    /// Also rewrite markers that require constant arguments.
    pub constant_aware: bool,
}

impl IntrinsifyPhase {
    pub fn constant_aware() -> Self {
        IntrinsifyPhase {
            constant_aware: true,
        }
    }
}

impl Phase for IntrinsifyPhase {
    fn name(&self) -> &'static str {
        "intrinsify"
    }

    fn apply(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        intrinsify(graph, cx.registry, self.constant_aware)?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::node::{ConstValue, InvokeKind, NodeKind};
    use crate::registry::{IntrinsicMarker, MethodBody, MethodId, MethodMeta, Modifiers};
    use crate::stamp::Stamp;

    fn registry_with_intrinsic(marker: IntrinsicMarker) -> (MethodRegistry, MethodId) {
        let mut reg = MethodRegistry::new();
        let class = reg.add_class("rt.Arrays", None).unwrap();
        let m = reg
            .add_method(
                class,
                MethodMeta {
                    name: "length".into(),
                    class,
                    modifiers: Modifiers {
                        is_static: true,
                        ..Default::default()
                    },
                    params: vec![Stamp::object()],
                    return_stamp: Stamp::int(),
                    snippet: None,
                    substitution: None,
                    macro_subst: None,
                    intrinsic: Some(marker),
                    body: Some(MethodBody::default()),
                },
            )
            .unwrap();
        (reg, m)
    }

    fn graph_calling(m: MethodId) -> (Graph, NodeId) {
        let mut g = Graph::new("t");
        let array = g.add(Node::param(0, Stamp::object())).unwrap();
        let target = g
            .add(Node::call_target(InvokeKind::Static, m, vec![array]))
            .unwrap();
        let invoke = g.add(Node::invoke(target, Stamp::int())).unwrap();
        g.add(Node::ret(Some(invoke))).unwrap();
        (g, invoke)
    }

    #[test]
    fn rewrites_marked_call_into_node() {
        let (reg, m) = registry_with_intrinsic(IntrinsicMarker {
            op: IntrinsicOp::ArrayLength,
            requires_const_args: false,
        });
        let (mut g, invoke) = graph_calling(m);
        assert_eq!(intrinsify(&mut g, &reg, false).unwrap(), 1);
        assert!(!g.is_live(invoke));
        assert_eq!(
            g.nodes_matching(|k| matches!(k, NodeKind::ArrayLength)).len(),
            1
        );
        assert!(g.invokes().is_empty());
    }

    #[test]
    fn const_args_marker_waits_for_constant_aware_run() {
        let (reg, m) = registry_with_intrinsic(IntrinsicMarker {
            op: IntrinsicOp::ArrayLength,
            requires_const_args: true,
        });

        // Non-constant argument: even the aware run declines.
        let (mut g, _) = graph_calling(m);
        assert_eq!(intrinsify(&mut g, &reg, true).unwrap(), 0);

        // Constant argument: the plain run declines, the aware run fires.
        let mut g = Graph::new("t");
        let c = g.add(Node::constant(ConstValue::Null)).unwrap();
        let target = g
            .add(Node::call_target(InvokeKind::Static, m, vec![c]))
            .unwrap();
        let invoke = g.add(Node::invoke(target, Stamp::int())).unwrap();
        g.add(Node::ret(Some(invoke))).unwrap();

        assert_eq!(intrinsify(&mut g, &reg, false).unwrap(), 0);
        assert_eq!(intrinsify(&mut g, &reg, true).unwrap(), 1);
    }

    #[test]
    fn arity_mismatch_is_fatal() {
        let (reg, m) = registry_with_intrinsic(IntrinsicMarker {
            op: IntrinsicOp::LoadIndexed {
                elem: crate::stamp::ElemKind::Int,
            },
            requires_const_args: false,
        });
        let (mut g, _) = graph_calling(m);
        assert!(matches!(
            intrinsify(&mut g, &reg, false),
            Err(GraphInternalError::Malformed(_))
        ));
    }
}
