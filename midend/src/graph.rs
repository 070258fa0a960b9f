// graph.rs — Mutable node arena
//
// Owns the nodes of one method's IR. Nodes live in dense slots addressed by
// NodeId; deletion tombstones the slot (ids stay stable during iteration,
// slots are never reused within a graph). Use lists are maintained on every
// structural edit so replace-and-delete is a local operation.
//
// Preconditions: inputs of an added node must already be live in this graph.
// Postconditions: use lists are consistent with input lists after every edit.
// Failure modes: structural misuse → GraphInternalError.

use std::fmt;
use std::ops::Index;

use crate::error::GraphInternalError;
use crate::node::{Node, NodeFlags, NodeKind};

// ── Node identity ───────────────────────────────────────────────────────────

/// Dense index of a node within its owning graph. Assigned on insertion;
/// a detached node has no id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

// ── Graph ───────────────────────────────────────────────────────────────────

/// Container of nodes for one method, with a monotonically increasing id
/// allocator.
#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    nodes: Vec<Node>,
    uses: Vec<Vec<NodeId>>,
    live: usize,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Graph {
            name: name.into(),
            nodes: Vec::new(),
            uses: Vec::new(),
            live: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of live (non-tombstoned) nodes.
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Total slots ever allocated, including tombstones.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index())
            .is_some_and(|n| !n.is_deleted())
    }

    pub fn try_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).filter(|n| !n.is_deleted())
    }

    /// Transfer ownership of a detached node into this graph, assigning its
    /// id. All inputs must already be live nodes of this graph.
    pub fn add(&mut self, node: Node) -> Result<NodeId, GraphInternalError> {
        for &input in &node.inputs {
            if !self.is_live(input) {
                return Err(GraphInternalError::InvalidInput { input });
            }
        }
        let id = NodeId(self.nodes.len() as u32);
        for &input in &node.inputs {
            self.uses[input.index()].push(id);
        }
        self.nodes.push(node);
        self.uses.push(Vec::new());
        self.live += 1;
        Ok(id)
    }

    /// Nodes that read `id`'s output.
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        &self.uses[id.index()]
    }

    /// Rewrite input `index` of `user` to point at `new_input`.
    pub fn set_input(
        &mut self,
        user: NodeId,
        index: usize,
        new_input: NodeId,
    ) -> Result<(), GraphInternalError> {
        if !self.is_live(user) {
            return Err(GraphInternalError::DeadNode { node: user });
        }
        if !self.is_live(new_input) {
            return Err(GraphInternalError::InvalidInput { input: new_input });
        }
        let old_input = self.nodes[user.index()].inputs[index];
        if old_input == new_input {
            return Ok(());
        }
        self.nodes[user.index()].inputs[index] = new_input;
        remove_one_use(&mut self.uses[old_input.index()], user);
        self.uses[new_input.index()].push(user);
        Ok(())
    }

    /// Rewrite all edges pointing at `old` to point at `new`, then tombstone
    /// `old`. The general replace-and-delete graph operation.
    pub fn replace_and_delete(
        &mut self,
        old: NodeId,
        new: NodeId,
    ) -> Result<(), GraphInternalError> {
        if old == new {
            return Err(GraphInternalError::ShouldNotReachHere(
                "replacing a node with itself".into(),
            ));
        }
        if !self.is_live(old) {
            return Err(GraphInternalError::DeadNode { node: old });
        }
        if !self.is_live(new) {
            return Err(GraphInternalError::DeadNode { node: new });
        }
        let users = std::mem::take(&mut self.uses[old.index()]);
        for user in &users {
            for input in &mut self.nodes[user.index()].inputs {
                if *input == old {
                    *input = new;
                }
            }
        }
        // Users may appear several times if they read `old` through more
        // than one edge; the use list mirrors edge multiplicity.
        self.uses[new.index()].extend(users);
        self.tombstone(old);
        Ok(())
    }

    /// Delete a node that has no remaining uses.
    pub fn delete(&mut self, id: NodeId) -> Result<(), GraphInternalError> {
        if !self.is_live(id) {
            return Err(GraphInternalError::DeadNode { node: id });
        }
        let uses = self.uses[id.index()].len();
        if uses > 0 {
            return Err(GraphInternalError::DeleteWithUses { node: id, uses });
        }
        self.tombstone(id);
        Ok(())
    }

    fn tombstone(&mut self, id: NodeId) {
        let inputs = std::mem::take(&mut self.nodes[id.index()].inputs);
        for input in inputs {
            remove_one_use(&mut self.uses[input.index()], id);
        }
        self.uses[id.index()].clear();
        self.nodes[id.index()].flags |= NodeFlags::DELETED;
        self.live -= 1;
    }

    // ── Iteration ───────────────────────────────────────────────────────

    /// Live nodes in id order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.is_deleted())
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Ids of live nodes in id order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Ids of live nodes matching a kind predicate.
    pub fn nodes_matching(&self, pred: impl Fn(&NodeKind) -> bool) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, n)| pred(&n.kind))
            .map(|(id, _)| id)
            .collect()
    }

    /// All call sites, in id order.
    pub fn invokes(&self) -> Vec<NodeId> {
        self.nodes_matching(|k| matches!(k, NodeKind::Invoke { .. }))
    }
}

impl Index<NodeId> for Graph {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        let node = &self.nodes[id.index()];
        assert!(!node.is_deleted(), "access to deleted node {id}");
        node
    }
}

impl Graph {
    /// Mutable access to a live node. Structural fields (inputs) must be
    /// edited through `set_input`/`replace_and_delete`; this is for stamps
    /// and kind payload.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        let node = &mut self.nodes[id.index()];
        assert!(!node.is_deleted(), "access to deleted node {id}");
        node
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "graph '{}' ({} nodes, {} slots)",
            self.name,
            self.live,
            self.nodes.len()
        )?;
        for (id, node) in self.iter() {
            write!(f, "  {id}: {}", node.kind.describe())?;
            if !node.inputs.is_empty() {
                write!(f, "(")?;
                for (i, input) in node.inputs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{input}")?;
                }
                write!(f, ")")?;
            }
            writeln!(f, " : {}", node.stamp())?;
        }
        Ok(())
    }
}

fn remove_one_use(uses: &mut Vec<NodeId>, user: NodeId) {
    if let Some(pos) = uses.iter().position(|&u| u == user) {
        uses.swap_remove(pos);
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{BinOp, ConstValue, Node};
    use crate::stamp::Stamp;

    fn two_const_graph() -> (Graph, NodeId, NodeId) {
        let mut g = Graph::new("t");
        let a = g.add(Node::constant(ConstValue::Int(1))).unwrap();
        let b = g.add(Node::constant(ConstValue::Int(2))).unwrap();
        (g, a, b)
    }

    #[test]
    fn add_assigns_dense_ids() {
        let (g, a, b) = two_const_graph();
        assert_eq!(a, NodeId(0));
        assert_eq!(b, NodeId(1));
        assert_eq!(g.live_count(), 2);
    }

    #[test]
    fn add_rejects_unknown_input() {
        let mut g = Graph::new("t");
        let err = g
            .add(Node::binary(
                BinOp::Add,
                NodeId(7),
                NodeId(8),
                Stamp::int(),
            ))
            .unwrap_err();
        assert!(matches!(err, GraphInternalError::InvalidInput { .. }));
    }

    #[test]
    fn uses_track_edges() {
        let (mut g, a, b) = two_const_graph();
        let sum = g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        assert_eq!(g.uses(a), &[sum]);
        assert_eq!(g.uses(b), &[sum]);
    }

    #[test]
    fn replace_and_delete_rewires_all_edges() {
        let (mut g, a, b) = two_const_graph();
        let sum = g.add(Node::binary(BinOp::Add, a, a, Stamp::int())).unwrap();
        g.replace_and_delete(a, b).unwrap();
        assert!(!g.is_live(a));
        assert_eq!(g[sum].inputs, vec![b, b]);
        assert_eq!(g.uses(b).len(), 2);
    }

    #[test]
    fn replace_with_self_is_an_error() {
        let (mut g, a, _) = two_const_graph();
        assert!(g.replace_and_delete(a, a).is_err());
    }

    #[test]
    fn delete_with_uses_is_an_error() {
        let (mut g, a, b) = two_const_graph();
        g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        let err = g.delete(a).unwrap_err();
        assert!(matches!(
            err,
            GraphInternalError::DeleteWithUses { uses: 1, .. }
        ));
    }

    #[test]
    fn tombstoned_slot_is_not_reused() {
        let (mut g, a, b) = two_const_graph();
        g.replace_and_delete(a, b).unwrap();
        let c = g.add(Node::constant(ConstValue::Int(3))).unwrap();
        assert_eq!(c, NodeId(2));
        assert_eq!(g.slot_count(), 3);
        assert_eq!(g.live_count(), 2);
    }

    #[test]
    fn deleting_a_user_releases_input_uses() {
        let (mut g, a, b) = two_const_graph();
        let sum = g.add(Node::binary(BinOp::Add, a, b, Stamp::int())).unwrap();
        g.delete(sum).unwrap();
        assert!(g.uses(a).is_empty());
        assert!(g.uses(b).is_empty());
        // Now `a` is deletable.
        g.delete(a).unwrap();
        assert!(!g.is_live(a));
    }
}
