//! # Content Hierarchy
//!
//! An arena of hierarchy objects (pack → category → collection →
//! achievement → objective). Every node has a local id, an optional parent
//! and an ordered child list. Parents are stored as indices, never as
//! owning pointers, so the tree has a single owner: the arena.
//!
//! ## Invariants
//!
//! - No cycles; every non-root node has exactly one parent.
//! - Sibling ids are unique.
//! - Root ids are namespaces (may contain `.`); child ids are single
//!   segments.
//! - Handles are generational. Once a node is disposed its [`NodeId`]
//!   never resolves again, even after the slot is reused.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HierarchyError;
use crate::identity::{self, SEPARATOR};

/// Generational handle to a node in a [`Hierarchy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A single hierarchy object.
#[derive(Debug, Clone)]
pub struct Node<T> {
    id: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    payload: T,
}

impl<T> Node<T> {
    /// The local id (unique among siblings).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The parent handle, `None` for roots.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered child handles.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Domain data attached to the node.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Mutable access to the domain data.
    pub fn payload_mut(&mut self) -> &mut T {
        &mut self.payload
    }

    /// Whether the node is a root.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Arena owning every hierarchy object.
#[derive(Debug, Clone)]
pub struct Hierarchy<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Hierarchy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Hierarchy<T> {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `node` refers to a live node.
    pub fn contains(&self, node: NodeId) -> bool {
        self.get(node).is_some()
    }

    /// Look up a node.
    pub fn get(&self, node: NodeId) -> Option<&Node<T>> {
        self.slots
            .get(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    /// Look up a node mutably.
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut Node<T>> {
        self.slots
            .get_mut(node.index as usize)
            .filter(|slot| slot.generation == node.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    /// Shortcut for `get(node).map(Node::payload)`.
    pub fn payload(&self, node: NodeId) -> Option<&T> {
        self.get(node).map(Node::payload)
    }

    /// Shortcut for `get_mut(node).map(Node::payload_mut)`.
    pub fn payload_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.get_mut(node).map(Node::payload_mut)
    }

    fn require(&self, node: NodeId) -> Result<&Node<T>, HierarchyError> {
        self.get(node)
            .ok_or_else(|| HierarchyError::UnknownNode(node.to_string()))
    }

    fn allocate(&mut self, node: Node<T>) -> NodeId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Create a root node. Root ids are namespaces and may contain `.`.
    pub fn create_root(
        &mut self,
        id: impl Into<String>,
        payload: T,
    ) -> Result<NodeId, HierarchyError> {
        let id = id.into();
        identity::validate_namespace(&id)?;
        Ok(self.allocate(Node {
            id,
            parent: None,
            children: Vec::new(),
            payload,
        }))
    }

    /// Create a node directly under `parent`.
    pub fn create_child(
        &mut self,
        parent: NodeId,
        id: impl Into<String>,
        payload: T,
    ) -> Result<NodeId, HierarchyError> {
        let id = id.into();
        identity::validate_segment(&id)?;
        self.ensure_unique_child(parent, &id)?;
        let child = self.allocate(Node {
            id,
            parent: Some(parent),
            children: Vec::new(),
            payload,
        });
        if let Some(parent_node) = self.get_mut(parent) {
            parent_node.children.push(child);
        }
        Ok(child)
    }

    fn ensure_unique_child(&self, parent: NodeId, id: &str) -> Result<(), HierarchyError> {
        let parent_node = self.require(parent)?;
        if self.find_child(parent, id).is_some() {
            return Err(HierarchyError::DuplicateSibling {
                id: id.to_string(),
                parent: self.full_name(parent).unwrap_or_else(|| parent_node.id.clone()),
            });
        }
        Ok(())
    }

    /// Move a detached root underneath `parent`, asserting the link.
    ///
    /// The child must currently be a root with a single-segment id, the
    /// id must be unique among `parent`'s children, and `parent` must not
    /// be inside the child's subtree.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> Result<(), HierarchyError> {
        let child_node = self.require(child)?;
        if child_node.parent.is_some() {
            return Err(HierarchyError::AlreadyAttached(self.describe(child)));
        }
        let child_id = child_node.id.clone();
        identity::validate_segment(&child_id)?;
        if self.ancestors(parent).any(|ancestor| ancestor == child) || parent == child {
            return Err(HierarchyError::Cycle {
                child: self.describe(child),
                parent: self.describe(parent),
            });
        }
        self.ensure_unique_child(parent, &child_id)?;

        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.push(child);
        }
        Ok(())
    }

    /// The child of `parent` whose local id equals `id`.
    pub fn find_child(&self, parent: NodeId, id: &str) -> Option<NodeId> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|child| self.get(*child).is_some_and(|node| node.id == id))
    }

    /// Walk `path` (segments joined by `.`) downward from `from`.
    ///
    /// An empty path yields `from`. On failure returns the first segment
    /// that had no matching child.
    pub fn walk<'p>(&self, from: NodeId, path: &'p str) -> Result<NodeId, &'p str> {
        let mut current = from;
        if path.is_empty() {
            return Ok(current);
        }
        for segment in path.split(SEPARATOR) {
            current = self.find_child(current, segment).ok_or(segment)?;
        }
        Ok(current)
    }

    /// Iterate from `node`'s parent up to its root.
    pub fn ancestors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut next = self.get(node).and_then(Node::parent);
        std::iter::from_fn(move || {
            let current = next?;
            next = self.get(current).and_then(Node::parent);
            Some(current)
        })
    }

    /// The root of the tree containing `node`.
    pub fn root_of(&self, node: NodeId) -> Option<NodeId> {
        self.get(node)?;
        Some(self.ancestors(node).last().unwrap_or(node))
    }

    /// Dot-joined ids from the root down to `node`.
    pub fn full_name(&self, node: NodeId) -> Option<String> {
        let own = self.get(node)?;
        let mut segments: Vec<&str> = self
            .ancestors(node)
            .filter_map(|ancestor| self.get(ancestor).map(|n| n.id.as_str()))
            .collect();
        segments.reverse();
        segments.push(own.id.as_str());
        let separator = SEPARATOR.to_string();
        Some(segments.join(separator.as_str()))
    }

    fn describe(&self, node: NodeId) -> String {
        self.full_name(node).unwrap_or_else(|| node.to_string())
    }

    /// Pre-order listing of `node` and its descendants.
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(n) = self.get(current) else { continue };
            out.push(current);
            stack.extend(n.children.iter().rev().copied());
        }
        out
    }

    /// All live roots, in slot order.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.node
                .as_ref()
                .filter(|node| node.parent.is_none())
                .map(|_| NodeId {
                    index: index as u32,
                    generation: slot.generation,
                })
        })
    }

    /// Remove `node` and its whole subtree.
    ///
    /// Nodes are disposed depth-first (children before their parent) and
    /// returned in that order with their payloads so callers can release
    /// payload-owned state. Returns an empty list for unknown handles.
    pub fn dispose(&mut self, node: NodeId) -> Vec<(NodeId, Node<T>)> {
        let Some(parent) = self.get(node).map(|n| n.parent) else {
            return Vec::new();
        };
        if let Some(parent_node) = parent.and_then(|p| self.get_mut(p)) {
            parent_node.children.retain(|child| *child != node);
        }

        let mut order = self.subtree(node);
        order.reverse();
        let mut removed = Vec::with_capacity(order.len());
        for id in order {
            let slot = &mut self.slots[id.index as usize];
            if let Some(taken) = slot.node.take() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                self.len -= 1;
                removed.push((id, taken));
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Hierarchy<&'static str>, NodeId, NodeId, NodeId) {
        let mut h = Hierarchy::new();
        let root = h.create_root("core.main", "pack").unwrap();
        let cat = h.create_child(root, "events", "category").unwrap();
        let ach = h.create_child(cat, "daily", "achievement").unwrap();
        (h, root, cat, ach)
    }

    #[test]
    fn full_name_joins_ids() {
        let (h, root, _, ach) = sample();
        assert_eq!(h.full_name(root).unwrap(), "core.main");
        assert_eq!(h.full_name(ach).unwrap(), "core.main.events.daily");
    }

    #[test]
    fn duplicate_sibling_is_rejected() {
        let (mut h, _, cat, _) = sample();
        let err = h.create_child(cat, "daily", "again").unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateSibling { .. }));
    }

    #[test]
    fn child_ids_are_single_segments() {
        let (mut h, root, _, _) = sample();
        assert!(h.create_child(root, "a.b", "x").is_err());
    }

    #[test]
    fn walk_reports_failing_segment() {
        let (h, root, _, ach) = sample();
        assert_eq!(h.walk(root, "events.daily"), Ok(ach));
        assert_eq!(h.walk(root, ""), Ok(root));
        assert_eq!(h.walk(root, "events.weekly"), Err("weekly"));
    }

    #[test]
    fn attach_asserts_links() {
        let (mut h, root, cat, _) = sample();
        let detached = h.create_root("weekly", "achievement").unwrap();
        h.attach(cat, detached).unwrap();
        assert_eq!(h.get(detached).unwrap().parent(), Some(cat));
        assert_eq!(h.full_name(detached).unwrap(), "core.main.events.weekly");

        assert!(matches!(
            h.attach(root, detached),
            Err(HierarchyError::AlreadyAttached(_))
        ));
    }

    #[test]
    fn attach_rejects_cycles() {
        let mut h: Hierarchy<()> = Hierarchy::new();
        let a = h.create_root("a", ()).unwrap();
        let b = h.create_child(a, "b", ()).unwrap();
        assert!(matches!(h.attach(b, a), Err(HierarchyError::Cycle { .. })));
    }

    #[test]
    fn dispose_is_depth_first_and_invalidates_handles() {
        let (mut h, root, cat, ach) = sample();
        let removed: Vec<_> = h.dispose(root).into_iter().map(|(id, _)| id).collect();
        assert_eq!(removed, vec![ach, cat, root]);
        assert!(h.is_empty());
        assert!(h.get(ach).is_none());

        let reused = h.create_root("other", "pack").unwrap();
        assert!(h.get(root).is_none());
        assert!(h.get(reused).is_some());
    }

    #[test]
    fn dispose_detaches_from_parent() {
        let (mut h, root, cat, _) = sample();
        h.dispose(cat);
        assert!(h.get(root).unwrap().children().is_empty());
        assert_eq!(h.len(), 1);
    }

    #[test]
    fn roots_lists_only_parentless_nodes() {
        let (mut h, root, _, _) = sample();
        let other = h.create_root("other", "pack").unwrap();
        let roots: Vec<_> = h.roots().collect();
        assert_eq!(roots, vec![root, other]);
        assert_eq!(h.root_of(other), Some(other));
    }
}
