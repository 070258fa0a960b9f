// inline.rs — Call-site inlining
//
// Splices a callee graph into a caller at one invoke. Callee nodes are
// copied in dependency order (a node is copied once all its inputs are),
// parameters map to the call's arguments, and returns determine what the
// invoke's uses are rewired to: the single returned value, or a Phi merging
// several. The invoke, its call target, and a now-unused frame state are
// deleted afterwards.
//
// Preconditions: `invoke` is a live Invoke whose target is a plain
//                CallTarget; argument count covers every callee parameter.
// Postconditions: no trace of the invoke remains; every side-effecting
//                 callee node has a copy in the caller.
// Failure modes: unmappable callee shape → GraphInternalError.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{Error, GraphInternalError};
use crate::graph::{Graph, NodeId};
use crate::node::{Node, NodeKind};
use crate::phase::{Phase, PhaseContext};
use crate::registry::{MethodId, MethodRegistry};
use crate::stamp::Stamp;

// ── Configuration ───────────────────────────────────────────────────────────

/// What happens to exception exits of the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExceptionMode {
    /// Copy Throw nodes into the caller.
    #[default]
    Propagate,
    /// Drop Throw nodes; used for template graphs whose exception paths
    /// are handled by the surrounding compilation.
    Suppress,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineConfig {
    pub exception_mode: ExceptionMode,
}

// ── Splice ──────────────────────────────────────────────────────────────────

/// Inline `callee` at `invoke`. Returns the node that now stands for the
/// call's result, if the callee produced one.
pub fn inline(
    graph: &mut Graph,
    invoke: NodeId,
    callee: &Graph,
    config: &InlineConfig,
) -> Result<Option<NodeId>, GraphInternalError> {
    let target = graph[invoke].invoke_target().ok_or_else(|| {
        GraphInternalError::ShouldNotReachHere(format!("inlining at non-invoke {invoke}"))
    })?;
    let state = graph[invoke].invoke_state();
    let args: Vec<NodeId> = graph[target].target_args().to_vec();

    // Copy callee nodes in dependency order. Id order is not topological
    // after rewrites, so iterate until a pass makes no progress.
    let mut map: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut done: FxHashSet<NodeId> = FxHashSet::default();
    let mut returns: Vec<Option<NodeId>> = Vec::new();
    let total = callee.live_count();

    while done.len() < total {
        let mut progressed = false;
        for (id, node) in callee.iter() {
            if done.contains(&id) {
                continue;
            }
            if !node.inputs.iter().all(|i| map.contains_key(i)) {
                continue;
            }
            progressed = true;
            done.insert(id);
            match &node.kind {
                NodeKind::Param { index } => {
                    let arg = args.get(*index as usize).copied().ok_or_else(|| {
                        GraphInternalError::Malformed(format!(
                            "callee '{}' reads parameter {index} but the call passes {} arguments",
                            callee.name(),
                            args.len()
                        ))
                    })?;
                    map.insert(id, arg);
                }
                NodeKind::Return => {
                    returns.push(node.inputs.first().map(|i| map[i]));
                }
                NodeKind::Throw if config.exception_mode == ExceptionMode::Suppress => {}
                _ => {
                    let mut copy = node.clone();
                    copy.inputs = node.inputs.iter().map(|i| map[i]).collect();
                    let new_id = graph.add(copy)?;
                    map.insert(id, new_id);
                }
            }
        }
        if !progressed {
            return Err(GraphInternalError::UnorderableCallee);
        }
    }

    // Resolve the call's result from the callee's exits.
    let values: Vec<NodeId> = returns.iter().filter_map(|v| *v).collect();
    let replacement = match values.as_slice() {
        [] => None,
        [single] => Some(*single),
        many => {
            let mut stamp = Stamp::illegal();
            for &v in many {
                stamp = stamp.meet(graph[v].stamp());
            }
            Some(graph.add(Node::phi(many.to_vec(), stamp))?)
        }
    };

    match replacement {
        Some(rep) => graph.replace_and_delete(invoke, rep)?,
        None => {
            if !graph.uses(invoke).is_empty() {
                return Err(GraphInternalError::Malformed(format!(
                    "callee '{}' returns no value but invoke {invoke} has uses",
                    callee.name()
                )));
            }
            graph.delete(invoke)?;
        }
    }
    if graph.is_live(target) && graph.uses(target).is_empty() {
        graph.delete(target)?;
    }
    if let Some(state) = state {
        if graph.is_live(state) && graph.uses(state).is_empty() {
            graph.delete(state)?;
        }
    }
    Ok(replacement)
}

// ── Policy ──────────────────────────────────────────────────────────────────

/// Decides which direct calls inside a template method get their callee
/// graph spliced in at installation time.
pub trait InliningPolicy: Send + Sync {
    fn name(&self) -> &'static str;
    fn should_inline(&self, registry: &MethodRegistry, caller: MethodId, callee: MethodId)
        -> bool;
}

/// Inline small concrete callees; never a method into itself.
#[derive(Debug, Clone, Copy)]
pub struct DefaultInliningPolicy {
    pub max_body_ops: usize,
}

impl Default for DefaultInliningPolicy {
    fn default() -> Self {
        DefaultInliningPolicy { max_body_ops: 32 }
    }
}

impl InliningPolicy for DefaultInliningPolicy {
    fn name(&self) -> &'static str {
        "default"
    }

    fn should_inline(
        &self,
        registry: &MethodRegistry,
        caller: MethodId,
        callee: MethodId,
    ) -> bool {
        if callee == caller {
            return false;
        }
        let meta = registry.method(callee);
        if meta.modifiers.is_abstract || meta.modifiers.is_native {
            return false;
        }
        meta.body
            .as_ref()
            .is_some_and(|b| b.ops.len() <= self.max_body_ops)
    }
}

/// Inline everything the splice can handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysInlinePolicy;

impl InliningPolicy for AlwaysInlinePolicy {
    fn name(&self) -> &'static str {
        "always"
    }

    fn should_inline(&self, registry: &MethodRegistry, caller: MethodId, callee: MethodId)
        -> bool {
        let meta = registry.method(callee);
        callee != caller && !meta.modifiers.is_abstract && !meta.modifiers.is_native
    }
}

// ── Phase ───────────────────────────────────────────────────────────────────

/// Inlines published graphs at direct call sites. Constructed through
/// `PhaseFactories` so a client can swap in its own inliner.
#[derive(Debug, Default)]
pub struct InliningPhase {
    pub config: InlineConfig,
}

impl Phase for InliningPhase {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn apply(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        let Some(storage) = cx.storage else {
            return Ok(());
        };
        // Snapshot: inlining adds invokes from callee bodies, and those are
        // not revisited in this run.
        for invoke in graph.invokes() {
            if !graph.is_live(invoke) {
                continue;
            }
            let target = match graph[invoke].invoke_target() {
                Some(t) => t,
                None => continue,
            };
            let Some((kind, method)) = graph[target].target_method() else {
                continue;
            };
            if !kind.is_direct() || matches!(graph[target].kind, NodeKind::SelfReplacingCallTarget { .. }) {
                continue;
            }
            if let Some(installed) = storage.graph_for(method) {
                inline(graph, invoke, &installed.graph, &self.config)?;
            }
        }
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
