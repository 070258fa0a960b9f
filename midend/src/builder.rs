// builder.rs — Graph construction from registry method bodies
//
// The IR-builder collaborator: turns a resolved method's portable body into
// a fresh graph. Body operands reference earlier ops by position, so nodes
// are created in input-before-user order.
//
// Preconditions: `method` is resolved in `registry`.
// Postconditions: returned graph contains one node per body op (plus call
//                 targets and frame states).
// Failure modes: abstract/native or body-less methods → GraphInternalError
//                (installer checks modifiers first); unresolvable callees
//                and types → ConfigurationError wrapping the lookup failure.

use crate::error::{ConfigurationError, Error, GraphInternalError, LookupError};
use crate::graph::{Graph, NodeId};
use crate::node::Node;
use crate::registry::{MethodId, MethodRegistry, Op};
use crate::stamp::Stamp;

// ── Configuration ───────────────────────────────────────────────────────────

/// Controls how much bookkeeping the builder attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Attach a frame-state snapshot to every call site.
    pub attach_frame_states: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            attach_frame_states: true,
        }
    }
}

impl BuilderConfig {
    /// Configuration for snippet graphs: no frame states — snippets are
    /// spliced into other graphs and carry no deopt bookkeeping of their own.
    pub fn snippet_default() -> Self {
        BuilderConfig {
            attach_frame_states: false,
        }
    }
}

// ── Entry point ─────────────────────────────────────────────────────────────

/// Build a fresh graph for `method`.
pub fn build(
    registry: &MethodRegistry,
    method: MethodId,
    config: &BuilderConfig,
) -> Result<Graph, Error> {
    let meta = registry.method(method);
    if meta.modifiers.is_abstract || meta.modifiers.is_native {
        return Err(GraphInternalError::ShouldNotReachHere(format!(
            "building a graph for abstract/native method '{}'",
            registry.qualified_name(method)
        ))
        .into());
    }
    let body = meta.body.as_ref().ok_or_else(|| {
        GraphInternalError::ShouldNotReachHere(format!(
            "method '{}' has no body",
            registry.qualified_name(method)
        ))
    })?;

    let mut graph = Graph::new(registry.qualified_name(method));
    let mut values: Vec<NodeId> = Vec::with_capacity(body.ops.len());

    for (pos, op) in body.ops.iter().enumerate() {
        let id = match op {
            Op::Const { value } => graph.add(Node::constant(*value))?,
            Op::Param { index } => {
                let stamp = meta
                    .params
                    .get(*index as usize)
                    .cloned()
                    .unwrap_or_else(Stamp::object);
                graph.add(Node::param(*index, stamp))?
            }
            Op::Binary { bin, lhs, rhs } => {
                let lhs = operand(&values, *lhs, pos)?;
                let rhs = operand(&values, *rhs, pos)?;
                let stamp = graph[lhs].stamp().clone();
                graph.add(Node::binary(*bin, lhs, rhs, stamp))?
            }
            Op::LoadIndexed {
                array,
                index,
                length,
                elem,
            } => {
                let array = operand(&values, *array, pos)?;
                let index = operand(&values, *index, pos)?;
                let length = operand(&values, *length, pos)?;
                graph.add(Node::load_indexed(array, index, length, *elem))?
            }
            Op::ArrayLength { array } => {
                let array = operand(&values, *array, pos)?;
                graph.add(Node::array_length(array))?
            }
            Op::Pi {
                object,
                class,
                exact,
            } => {
                if !registry.types().contains(class) {
                    return Err(ConfigurationError::UnresolvedType {
                        name: class.clone(),
                        source: LookupError::UnknownType(class.clone()),
                    }
                    .into());
                }
                let declared = if *exact {
                    Stamp::object_exact(class.clone())
                } else {
                    Stamp::object_typed(class.clone())
                };
                let object = operand(&values, *object, pos)?;
                graph.add(Node::pi(object, declared))?
            }
            Op::Call {
                kind,
                class,
                name,
                args,
            } => {
                let callee = registry.lookup_qualified(class, name).map_err(|source| {
                    ConfigurationError::UnresolvedCallee {
                        class: class.clone(),
                        name: name.clone(),
                        source,
                    }
                })?;
                let mut arg_ids = Vec::with_capacity(args.len());
                for &arg in args {
                    arg_ids.push(operand(&values, arg, pos)?);
                }
                let return_stamp = registry.method(callee).return_stamp.clone();
                let target = graph.add(Node::call_target(*kind, callee, arg_ids.clone()))?;
                if config.attach_frame_states {
                    let state = graph.add(Node::frame_state(arg_ids))?;
                    graph.add(Node::invoke_with_state(target, state, return_stamp))?
                } else {
                    graph.add(Node::invoke(target, return_stamp))?
                }
            }
            Op::Instrument { tag, value } => {
                let value = operand(&values, *value, pos)?;
                graph.add(Node::instrument(tag.clone(), value))?
            }
            Op::Throw { value } => {
                let value = operand(&values, *value, pos)?;
                graph.add(Node::throw(value))?
            }
            Op::Return { value } => {
                let value = match value {
                    Some(v) => Some(operand(&values, *v, pos)?),
                    None => None,
                };
                graph.add(Node::ret(value))?
            }
        };
        values.push(id);
    }

    Ok(graph)
}

fn operand(values: &[NodeId], index: usize, at: usize) -> Result<NodeId, ConfigurationError> {
    if index >= values.len() {
        return Err(ConfigurationError::MalformedRegistry(format!(
            "op {at} references operand {index}, but only {} ops precede it",
            values.len()
        )));
    }
    Ok(values[index])
}

// ── Tests ───────────────────────────────────────────────────────────────────
