// node.rs — Typed dataflow node model
//
// Nodes are the vertices of the instruction graph: a closed tagged-variant
// kind, an ordered input list, a result stamp, and property flags. A node is
// created detached (it owns no id) and becomes addressable only once added
// to a graph, which assigns its id. Per-kind behavior for type inference and
// canonicalization lives here; structural edits live in graph.rs.
//
// Failure modes: none (inference returns None for unknown, not an error).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{Graph, NodeId};
use crate::registry::{MethodId, TypeTable};
use crate::stamp::{ElemKind, Stamp, StampKind};

// ── Scalar attribute types ──────────────────────────────────────────────────

/// Dispatch kind of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvokeKind {
    Static,
    Special,
    Virtual,
    Interface,
}

impl InvokeKind {
    /// Whether call sites of this kind bind a single target at compile time.
    pub fn is_direct(self) -> bool {
        matches!(self, InvokeKind::Static | InvokeKind::Special)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
}

/// A compile-time constant value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Long(i64),
    Float(f64),
    Null,
}

impl ConstValue {
    pub fn stamp(&self) -> Stamp {
        match self {
            ConstValue::Int(_) => Stamp::int(),
            ConstValue::Long(_) => Stamp::long(),
            ConstValue::Float(_) => Stamp::float(),
            ConstValue::Null => Stamp::object(),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}L"),
            ConstValue::Float(v) => write!(f, "{v}f"),
            ConstValue::Null => write!(f, "null"),
        }
    }
}

// ── Flags ───────────────────────────────────────────────────────────────────

bitflags::bitflags! {
    /// Boolean node properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Node observes or mutates external state — never eliminate,
        /// regardless of use count.
        const LIVE_SIDE_EFFECT = 0b0000_0001;
        /// Tombstone: the node was deleted; its arena slot is retired.
        const DELETED = 0b0000_0010;
        /// Traversal scratch bit (mark phase of dead-code elimination).
        const MARKED = 0b0000_0100;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        NodeFlags::empty()
    }
}

// ── Node kind ───────────────────────────────────────────────────────────────

/// The closed set of node variants. Positional inputs are documented per
/// variant; attribute data (non-edge payload) lives in the variant itself.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Formal parameter of the enclosing method. Inputs: none.
    Param { index: u16 },
    /// Compile-time constant. Inputs: none.
    Const { value: ConstValue },
    /// Two-operand arithmetic. Inputs: `[lhs, rhs]`.
    Binary { op: BinOp },
    /// Read of an array element. Inputs: `[array, index, length]`.
    LoadIndexed { elem: ElemKind },
    /// Length of an array. Inputs: `[array]`.
    ArrayLength,
    /// Narrows the type of its object input to `declared`, optionally
    /// anchored to a guard establishing the narrowing's validity scope.
    /// Inputs: `[object]` or `[object, guard]`.
    Pi { declared: Stamp, has_guard: bool },
    /// Anchor point proving a condition. Inputs: `[condition]`.
    Guard,
    /// Call target carrying the callee and dispatch kind.
    /// Inputs: the arguments.
    CallTarget {
        invoke_kind: InvokeKind,
        method: MethodId,
    },
    /// A call target that swaps itself for a plain `CallTarget` against the
    /// replacement method when lowered. Inputs: the original arguments
    /// (`arg_count` of them) followed by the replacement arguments.
    SelfReplacingCallTarget {
        invoke_kind: InvokeKind,
        method: MethodId,
        arg_count: usize,
        replacement_method: MethodId,
        replacement_return: Stamp,
    },
    /// Call site. Inputs: `[target]` or `[target, state]`.
    Invoke { has_state: bool },
    /// Bookkeeping snapshot of live values at a call site. Inputs: values.
    FrameState,
    /// Placeholder standing in for a state snapshot after a call.
    /// Inputs: `[invoke]`.
    StateAfterPlaceholder,
    /// Simulation/instrumentation probe. Always carries
    /// `LIVE_SIDE_EFFECT`. Inputs: `[value]`.
    Instrument { tag: String },
    /// Exception exit. Inputs: `[value]`.
    Throw,
    /// Value merge of multiple producers. Inputs: the operands.
    Phi,
    /// Method exit. Inputs: `[]` (void) or `[value]`.
    Return,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Param { .. } => "Param",
            NodeKind::Const { .. } => "Const",
            NodeKind::Binary { .. } => "Binary",
            NodeKind::LoadIndexed { .. } => "LoadIndexed",
            NodeKind::ArrayLength => "ArrayLength",
            NodeKind::Pi { .. } => "Pi",
            NodeKind::Guard => "Guard",
            NodeKind::CallTarget { .. } => "CallTarget",
            NodeKind::SelfReplacingCallTarget { .. } => "SelfReplacingCallTarget",
            NodeKind::Invoke { .. } => "Invoke",
            NodeKind::FrameState => "FrameState",
            NodeKind::StateAfterPlaceholder => "StateAfterPlaceholder",
            NodeKind::Instrument { .. } => "Instrument",
            NodeKind::Throw => "Throw",
            NodeKind::Phi => "Phi",
            NodeKind::Return => "Return",
        }
    }

    /// Short human-readable form including attribute payload.
    pub fn describe(&self) -> String {
        match self {
            NodeKind::Param { index } => format!("Param({index})"),
            NodeKind::Const { value } => format!("Const {value}"),
            NodeKind::Binary { op } => format!("{op:?}"),
            NodeKind::Instrument { tag } => format!("Instrument[{tag}]"),
            other => other.name().to_string(),
        }
    }
}

// ── Node ────────────────────────────────────────────────────────────────────

/// A graph vertex. Detached until added to a graph; the graph owns it and
/// assigns its id on insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub inputs: Vec<NodeId>,
    pub stamp: Stamp,
    pub flags: NodeFlags,
}

impl Node {
    fn new(kind: NodeKind, inputs: Vec<NodeId>, stamp: Stamp) -> Self {
        Node {
            kind,
            inputs,
            stamp,
            flags: NodeFlags::empty(),
        }
    }

    pub fn param(index: u16, stamp: Stamp) -> Self {
        Node::new(NodeKind::Param { index }, Vec::new(), stamp)
    }

    pub fn constant(value: ConstValue) -> Self {
        let stamp = value.stamp();
        Node::new(NodeKind::Const { value }, Vec::new(), stamp)
    }

    pub fn binary(op: BinOp, lhs: NodeId, rhs: NodeId, stamp: Stamp) -> Self {
        Node::new(NodeKind::Binary { op }, vec![lhs, rhs], stamp)
    }

    pub fn load_indexed(array: NodeId, index: NodeId, length: NodeId, elem: ElemKind) -> Self {
        Node::new(
            NodeKind::LoadIndexed { elem },
            vec![array, index, length],
            Stamp::of_elem(elem),
        )
    }

    pub fn array_length(array: NodeId) -> Self {
        Node::new(NodeKind::ArrayLength, vec![array], Stamp::int())
    }

    pub fn pi(object: NodeId, declared: Stamp) -> Self {
        let stamp = declared.clone();
        Node::new(
            NodeKind::Pi {
                declared,
                has_guard: false,
            },
            vec![object],
            stamp,
        )
    }

    pub fn pi_guarded(object: NodeId, declared: Stamp, guard: NodeId) -> Self {
        let stamp = declared.clone();
        Node::new(
            NodeKind::Pi {
                declared,
                has_guard: true,
            },
            vec![object, guard],
            stamp,
        )
    }

    pub fn guard(condition: NodeId) -> Self {
        Node::new(NodeKind::Guard, vec![condition], Stamp::void())
    }

    pub fn call_target(invoke_kind: InvokeKind, method: MethodId, args: Vec<NodeId>) -> Self {
        Node::new(
            NodeKind::CallTarget {
                invoke_kind,
                method,
            },
            args,
            Stamp::void(),
        )
    }

    pub fn self_replacing_call_target(
        invoke_kind: InvokeKind,
        method: MethodId,
        args: Vec<NodeId>,
        replacement_method: MethodId,
        replacement_args: Vec<NodeId>,
        replacement_return: Stamp,
    ) -> Self {
        let arg_count = args.len();
        let mut inputs = args;
        inputs.extend(replacement_args);
        Node::new(
            NodeKind::SelfReplacingCallTarget {
                invoke_kind,
                method,
                arg_count,
                replacement_method,
                replacement_return,
            },
            inputs,
            Stamp::void(),
        )
    }

    pub fn invoke(target: NodeId, return_stamp: Stamp) -> Self {
        Node::new(NodeKind::Invoke { has_state: false }, vec![target], return_stamp)
    }

    pub fn invoke_with_state(target: NodeId, state: NodeId, return_stamp: Stamp) -> Self {
        Node::new(
            NodeKind::Invoke { has_state: true },
            vec![target, state],
            return_stamp,
        )
    }

    pub fn frame_state(values: Vec<NodeId>) -> Self {
        Node::new(NodeKind::FrameState, values, Stamp::void())
    }

    pub fn state_after_placeholder(invoke: NodeId) -> Self {
        Node::new(NodeKind::StateAfterPlaceholder, vec![invoke], Stamp::void())
    }

    pub fn instrument(tag: impl Into<String>, value: NodeId) -> Self {
        let mut node = Node::new(
            NodeKind::Instrument { tag: tag.into() },
            vec![value],
            Stamp::void(),
        );
        node.flags |= NodeFlags::LIVE_SIDE_EFFECT;
        node
    }

    pub fn throw(value: NodeId) -> Self {
        let mut node = Node::new(NodeKind::Throw, vec![value], Stamp::void());
        node.flags |= NodeFlags::LIVE_SIDE_EFFECT;
        node
    }

    pub fn phi(operands: Vec<NodeId>, stamp: Stamp) -> Self {
        Node::new(NodeKind::Phi, operands, stamp)
    }

    pub fn ret(value: Option<NodeId>) -> Self {
        let inputs = match value {
            Some(v) => vec![v],
            None => Vec::new(),
        };
        Node::new(NodeKind::Return, inputs, Stamp::void())
    }

    // ── Predicates and accessors ────────────────────────────────────────

    pub fn stamp(&self) -> &Stamp {
        &self.stamp
    }

    pub fn is_deleted(&self) -> bool {
        self.flags.contains(NodeFlags::DELETED)
    }

    pub fn has_live_side_effect(&self) -> bool {
        self.flags.contains(NodeFlags::LIVE_SIDE_EFFECT)
    }

    pub fn is_invoke(&self) -> bool {
        matches!(self.kind, NodeKind::Invoke { .. })
    }

    pub fn is_call_target(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::CallTarget { .. } | NodeKind::SelfReplacingCallTarget { .. }
        )
    }

    pub fn is_const(&self) -> bool {
        matches!(self.kind, NodeKind::Const { .. })
    }

    pub fn as_const(&self) -> Option<ConstValue> {
        match self.kind {
            NodeKind::Const { value } => Some(value),
            _ => None,
        }
    }

    /// The object input of a Pi node.
    pub fn pi_object(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Pi { .. } => Some(self.inputs[0]),
            _ => None,
        }
    }

    /// Callee and dispatch kind of a call target (either variant).
    pub fn target_method(&self) -> Option<(InvokeKind, MethodId)> {
        match self.kind {
            NodeKind::CallTarget {
                invoke_kind,
                method,
            } => Some((invoke_kind, method)),
            NodeKind::SelfReplacingCallTarget {
                invoke_kind,
                method,
                ..
            } => Some((invoke_kind, method)),
            _ => None,
        }
    }

    /// Argument inputs of a call target (original arguments only for the
    /// self-replacing variant).
    pub fn target_args(&self) -> &[NodeId] {
        match self.kind {
            NodeKind::CallTarget { .. } => &self.inputs,
            NodeKind::SelfReplacingCallTarget { arg_count, .. } => &self.inputs[..arg_count],
            _ => &[],
        }
    }

    /// Replacement argument inputs of a self-replacing call target.
    pub fn replacement_args(&self) -> &[NodeId] {
        match self.kind {
            NodeKind::SelfReplacingCallTarget { arg_count, .. } => &self.inputs[arg_count..],
            _ => &[],
        }
    }

    /// The call-target input of an invoke.
    pub fn invoke_target(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Invoke { .. } => Some(self.inputs[0]),
            _ => None,
        }
    }

    /// The frame-state input of an invoke, if attached.
    pub fn invoke_state(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Invoke { has_state: true } => Some(self.inputs[1]),
            _ => None,
        }
    }

    pub fn accept<V: NodeVisitor + ?Sized>(&self, id: NodeId, visitor: &mut V) {
        match &self.kind {
            NodeKind::Param { index } => visitor.visit_param(id, self, *index),
            NodeKind::Const { value } => visitor.visit_const(id, self, *value),
            NodeKind::Binary { op } => visitor.visit_binary(id, self, *op),
            NodeKind::LoadIndexed { elem } => visitor.visit_load_indexed(id, self, *elem),
            NodeKind::ArrayLength => visitor.visit_array_length(id, self),
            NodeKind::Pi { declared, .. } => visitor.visit_pi(id, self, declared),
            NodeKind::Guard => visitor.visit_guard(id, self),
            NodeKind::CallTarget { .. } => visitor.visit_call_target(id, self),
            NodeKind::SelfReplacingCallTarget { .. } => {
                visitor.visit_self_replacing_call_target(id, self)
            }
            NodeKind::Invoke { .. } => visitor.visit_invoke(id, self),
            NodeKind::FrameState => visitor.visit_frame_state(id, self),
            NodeKind::StateAfterPlaceholder => visitor.visit_state_after_placeholder(id, self),
            NodeKind::Instrument { tag } => visitor.visit_instrument(id, self, tag),
            NodeKind::Throw => visitor.visit_throw(id, self),
            NodeKind::Phi => visitor.visit_phi(id, self),
            NodeKind::Return => visitor.visit_return(id, self),
        }
    }
}

// ── Visitor ─────────────────────────────────────────────────────────────────

/// Double-dispatch over node kinds. Passes that walk the graph (lowering,
/// emission, printing) implement the methods they care about; the rest
/// default to no-ops.
pub trait NodeVisitor {
    fn visit_param(&mut self, _id: NodeId, _node: &Node, _index: u16) {}
    fn visit_const(&mut self, _id: NodeId, _node: &Node, _value: ConstValue) {}
    fn visit_binary(&mut self, _id: NodeId, _node: &Node, _op: BinOp) {}
    fn visit_load_indexed(&mut self, _id: NodeId, _node: &Node, _elem: ElemKind) {}
    fn visit_array_length(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_pi(&mut self, _id: NodeId, _node: &Node, _declared: &Stamp) {}
    fn visit_guard(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_call_target(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_self_replacing_call_target(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_invoke(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_frame_state(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_state_after_placeholder(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_instrument(&mut self, _id: NodeId, _node: &Node, _tag: &str) {}
    fn visit_throw(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_phi(&mut self, _id: NodeId, _node: &Node) {}
    fn visit_return(&mut self, _id: NodeId, _node: &Node) {}
}

// ── Type queries ────────────────────────────────────────────────────────────

/// Best statically-known type of a node's result, without running code.
/// Unknown is a valid outcome, not an error.
pub fn declared_type(graph: &Graph, types: &TypeTable, id: NodeId) -> Option<String> {
    let node = &graph[id];
    match node.kind {
        // Delegates to the array operand's declared component type.
        NodeKind::LoadIndexed { .. } => {
            let array = &graph[node.inputs[0]];
            let array_ty = array.stamp().ty.as_deref()?;
            types.component_of(array_ty).map(str::to_owned)
        }
        _ => node.stamp().ty.clone(),
    }
}

/// The exactly precise type of a node's result, if determinable.
pub fn exact_type(graph: &Graph, types: &TypeTable, id: NodeId) -> Option<String> {
    let declared = declared_type(graph, types, id)?;
    if graph[id].stamp().exact || types.is_final(&declared) {
        Some(declared)
    } else {
        None
    }
}

// ── Stamp inference ─────────────────────────────────────────────────────────

/// Recompute a node's stamp from its inputs. Returns the new stamp if it
/// differs from the current one. The result is always the join of the old
/// stamp with input-derived information, so inference can only narrow.
pub fn infer_stamp(graph: &Graph, types: &TypeTable, id: NodeId) -> Option<Stamp> {
    let node = &graph[id];
    let old = node.stamp();
    let new = match &node.kind {
        NodeKind::Pi { declared, .. } => {
            let object = &graph[node.inputs[0]];
            declared.join(object.stamp())
        }
        NodeKind::LoadIndexed { elem } => {
            if *elem != ElemKind::Object {
                return None;
            }
            let array = &graph[node.inputs[0]];
            match array.stamp().ty.as_deref().and_then(|t| types.component_of(t)) {
                Some(component) => {
                    let component_stamp = if types.is_final(component) {
                        Stamp::object_exact(component)
                    } else {
                        Stamp::object_typed(component)
                    };
                    old.join(&component_stamp)
                }
                None => return None,
            }
        }
        NodeKind::Phi => {
            let mut merged = Stamp::illegal();
            for &operand in &node.inputs {
                merged = merged.meet(graph[operand].stamp());
            }
            old.join(&merged)
        }
        _ => return None,
    };
    if &new != old {
        Some(new)
    } else {
        None
    }
}

// ── Canonicalization ────────────────────────────────────────────────────────

/// Outcome of asking a node for its canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum Canonical {
    /// The node is already canonical.
    Unchanged,
    /// Replace all uses with an existing node and delete this one.
    Replace(NodeId),
    /// Replace all uses with a fresh constant and delete this one.
    Fold(ConstValue),
}

/// Local rewrite rules. Every accepted rewrite deletes the node (replacing
/// its uses), so canonicalization makes strict progress. Stamps are assumed
/// freshly inferred by the caller.
pub fn canonical(graph: &Graph, id: NodeId) -> Canonical {
    let node = &graph[id];
    if node.has_live_side_effect() {
        return Canonical::Unchanged;
    }
    match &node.kind {
        // A Pi whose stamp equals its input's stamp contributes nothing.
        NodeKind::Pi { .. } => {
            let object = node.inputs[0];
            if node.stamp() == graph[object].stamp() {
                Canonical::Replace(object)
            } else {
                Canonical::Unchanged
            }
        }
        NodeKind::Binary { op } => canonical_binary(graph, node, *op),
        _ => Canonical::Unchanged,
    }
}

fn canonical_binary(graph: &Graph, node: &Node, op: BinOp) -> Canonical {
    let lhs = node.inputs[0];
    let rhs = node.inputs[1];
    let lc = graph[lhs].as_const();
    let rc = graph[rhs].as_const();

    if let (Some(a), Some(b)) = (lc, rc) {
        if let Some(folded) = fold_const(op, a, b) {
            return Canonical::Fold(folded);
        }
    }

    // Identities on integer kinds only; float arithmetic is left alone.
    if matches!(node.stamp().kind, StampKind::Int | StampKind::Long) {
        match (op, lc, rc) {
            (BinOp::Add, Some(ConstValue::Int(0) | ConstValue::Long(0)), _) => {
                return Canonical::Replace(rhs)
            }
            (BinOp::Add | BinOp::Sub, _, Some(ConstValue::Int(0) | ConstValue::Long(0))) => {
                return Canonical::Replace(lhs)
            }
            (BinOp::Mul, _, Some(ConstValue::Int(1) | ConstValue::Long(1))) => {
                return Canonical::Replace(lhs)
            }
            (BinOp::Mul, Some(ConstValue::Int(1) | ConstValue::Long(1)), _) => {
                return Canonical::Replace(rhs)
            }
            _ => {}
        }
    }
    Canonical::Unchanged
}

fn fold_const(op: BinOp, a: ConstValue, b: ConstValue) -> Option<ConstValue> {
    use ConstValue::*;
    let int = |v: i64| Some(Int(v));
    let long = |v: i64| Some(Long(v));
    match (a, b) {
        (Int(x), Int(y)) => match op {
            BinOp::Add => int(x.wrapping_add(y)),
            BinOp::Sub => int(x.wrapping_sub(y)),
            BinOp::Mul => int(x.wrapping_mul(y)),
            BinOp::And => int(x & y),
            BinOp::Or => int(x | y),
        },
        (Long(x), Long(y)) => match op {
            BinOp::Add => long(x.wrapping_add(y)),
            BinOp::Sub => long(x.wrapping_sub(y)),
            BinOp::Mul => long(x.wrapping_mul(y)),
            BinOp::And => long(x & y),
            BinOp::Or => long(x | y),
        },
        _ => None,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
