//! # Fulfillment Propagation Graph
//!
//! Conditions form binary-ish trees: each condition carries at most one
//! action, one AND sub-condition and one OR sub-condition.
//!
//! ```text
//! local = action (absent ⇒ true) ∧ and (absent ⇒ true)
//! total = local ∨ (or present ∧ or)
//! ```
//!
//! ## Propagation
//!
//! Updating an action pushes its condition onto a work queue. Each popped
//! condition recomputes its value; a changed value enqueues its parent.
//! Values are always maintained eagerly, so reads never observe stale
//! state. What freezing controls is *notification*: a frozen condition
//! records no [`FulfillmentChange`] until it is unfrozen, at which point it
//! reports its value if it differs from the last one it reported.
//!
//! ## Branch Freezing
//!
//! An unfrozen condition keeps its branches frozen whenever their value
//! cannot matter:
//!
//! - the OR branch while the local term is already true;
//! - the AND branch while the action is unfulfilled.
//!
//! The freeze state of both branches is refreshed every time the condition
//! is recomputed.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use apack_core::{Observers, ResolvableReference};
use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::error::{FulfillError, FulfillResult};

/// Generational handle to a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConditionId {
    index: u32,
    generation: u32,
}

impl fmt::Display for ConditionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}v{}", self.index, self.generation)
    }
}

/// A reported change of a condition's total fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FulfillmentChange {
    /// The condition whose value changed.
    pub condition: ConditionId,
    /// Its new value.
    pub fulfilled: bool,
}

/// The action carried by a condition.
#[derive(Debug, Clone)]
pub struct Action {
    kind: ActionKind,
    fulfilled: bool,
    frozen: bool,
}

impl Action {
    /// What the action tests.
    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Last value set for this action.
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled
    }

    /// Whether evaluation of this action is currently skipped.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Combine the three terms of a condition.
///
/// `None` means the term is absent: an absent action or AND branch counts
/// as true, an absent OR branch as false.
pub fn combine(action: Option<bool>, and: Option<bool>, or: Option<bool>) -> bool {
    let local = action.unwrap_or(true) && and.unwrap_or(true);
    local || or.unwrap_or(false)
}

#[derive(Debug)]
struct ConditionNode {
    action: Option<Action>,
    and: Option<ConditionId>,
    or: Option<ConditionId>,
    parent: Option<ConditionId>,
    frozen: bool,
    fulfilled: bool,
    notified: bool,
    observers: Arc<Observers<FulfillmentChange>>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<ConditionNode>,
}

/// Arena of every condition and action known to a catalog.
#[derive(Debug, Default)]
pub struct ConditionGraph {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl ConditionGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live conditions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `id` refers to a live condition.
    pub fn contains(&self, id: ConditionId) -> bool {
        self.node(id).is_some()
    }

    fn node(&self, id: ConditionId) -> Option<&ConditionNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: ConditionId) -> Option<&mut ConditionNode> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn require(&self, id: ConditionId) -> FulfillResult<&ConditionNode> {
        self.node(id).ok_or(FulfillError::UnknownCondition(id))
    }

    /// Create a condition over existing, unowned sub-conditions.
    ///
    /// New actions start unfulfilled. No change is reported for the
    /// initial value.
    pub fn add_condition(
        &mut self,
        action: Option<ActionKind>,
        and: Option<ConditionId>,
        or: Option<ConditionId>,
    ) -> FulfillResult<ConditionId> {
        if action.is_none() && and.is_none() && or.is_none() {
            return Err(FulfillError::EmptyCondition);
        }
        for sub in [and, or].into_iter().flatten() {
            if self.require(sub)?.parent.is_some() {
                return Err(FulfillError::AlreadyOwned(sub));
            }
        }
        if let (Some(a), Some(o)) = (and, or) {
            if a == o {
                return Err(FulfillError::AlreadyOwned(o));
            }
        }

        let action = action.map(|kind| Action {
            kind,
            fulfilled: false,
            frozen: false,
        });
        let fulfilled = combine(
            action.as_ref().map(|a| a.fulfilled),
            and.and_then(|c| self.is_fulfilled(c)),
            or.and_then(|c| self.is_fulfilled(c)),
        );
        let id = self.allocate(ConditionNode {
            action,
            and,
            or,
            parent: None,
            frozen: false,
            fulfilled,
            notified: fulfilled,
            observers: Arc::new(Observers::new()),
        });
        for sub in [and, or].into_iter().flatten() {
            if let Some(node) = self.node_mut(sub) {
                node.parent = Some(id);
            }
        }
        let mut ignored = Vec::new();
        self.refresh_branch_freeze(id, &mut ignored);
        Ok(id)
    }

    fn allocate(&mut self, node: ConditionNode) -> ConditionId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            ConditionId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            ConditionId {
                index,
                generation: 0,
            }
        }
    }

    /// Total fulfillment of a condition.
    pub fn is_fulfilled(&self, id: ConditionId) -> Option<bool> {
        self.node(id).map(|n| n.fulfilled)
    }

    /// The local term (`action ∧ and`) of a condition.
    pub fn is_locally_fulfilled(&self, id: ConditionId) -> Option<bool> {
        let node = self.node(id)?;
        Some(self.local_of(node))
    }

    /// Whether notifications of this condition are suppressed.
    pub fn is_frozen(&self, id: ConditionId) -> Option<bool> {
        self.node(id).map(|n| n.frozen)
    }

    /// The action of a condition, if it has one.
    pub fn action(&self, id: ConditionId) -> Option<&Action> {
        self.node(id)?.action.as_ref()
    }

    /// The AND sub-condition.
    pub fn and_condition(&self, id: ConditionId) -> Option<ConditionId> {
        self.node(id)?.and
    }

    /// The OR sub-condition.
    pub fn or_condition(&self, id: ConditionId) -> Option<ConditionId> {
        self.node(id)?.or
    }

    /// The owning condition, `None` for tree roots.
    pub fn parent(&self, id: ConditionId) -> Option<ConditionId> {
        self.node(id)?.parent
    }

    /// Subscription registry of a condition.
    pub fn observers(&self, id: ConditionId) -> Option<Arc<Observers<FulfillmentChange>>> {
        self.node(id).map(|n| Arc::clone(&n.observers))
    }

    /// Pre-order listing of a condition tree (self, AND, OR).
    pub fn subtree(&self, id: ConditionId) -> Vec<ConditionId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else { continue };
            out.push(current);
            stack.extend(node.or);
            stack.extend(node.and);
        }
        out
    }

    /// References of every resolvable action in a condition tree.
    pub fn references(&self, id: ConditionId) -> Vec<Arc<ResolvableReference>> {
        self.subtree(id)
            .into_iter()
            .filter_map(|c| self.action(c)?.kind.reference().cloned())
            .collect()
    }

    fn local_of(&self, node: &ConditionNode) -> bool {
        node.action.as_ref().map_or(true, |a| a.fulfilled)
            && node.and.and_then(|c| self.is_fulfilled(c)).unwrap_or(true)
    }

    fn compute(&self, id: ConditionId) -> Option<bool> {
        let node = self.node(id)?;
        Some(combine(
            node.action.as_ref().map(|a| a.fulfilled),
            node.and.and_then(|c| self.is_fulfilled(c)),
            node.or.and_then(|c| self.is_fulfilled(c)),
        ))
    }

    /// Set an action's value and propagate.
    ///
    /// Returns the changes to dispatch, innermost first. Setting the
    /// current value is a no-op.
    pub fn set_action_fulfilled(
        &mut self,
        id: ConditionId,
        fulfilled: bool,
    ) -> FulfillResult<Vec<FulfillmentChange>> {
        let node = self.node_mut(id).ok_or(FulfillError::UnknownCondition(id))?;
        let action = node.action.as_mut().ok_or(FulfillError::NoAction(id))?;
        if action.fulfilled == fulfilled {
            return Ok(Vec::new());
        }
        action.fulfilled = fulfilled;

        let mut changes = Vec::new();
        self.propagate(id, &mut changes);
        Ok(changes)
    }

    fn propagate(&mut self, start: ConditionId, changes: &mut Vec<FulfillmentChange>) {
        let mut queue = VecDeque::from([start]);
        while let Some(id) = queue.pop_front() {
            let Some(after) = self.compute(id) else { continue };
            let Some(node) = self.node_mut(id) else { continue };
            let before = std::mem::replace(&mut node.fulfilled, after);
            let frozen = node.frozen;
            let parent = node.parent;

            if !frozen {
                self.refresh_branch_freeze(id, changes);
                self.emit_if_changed(id, changes);
            }
            if before != after {
                queue.extend(parent);
            }
        }
    }

    fn refresh_branch_freeze(&mut self, id: ConditionId, changes: &mut Vec<FulfillmentChange>) {
        let Some(node) = self.node(id) else { return };
        let local = self.local_of(node);
        let action_unfulfilled = node.action.as_ref().is_some_and(|a| !a.fulfilled);
        let (and, or) = (node.and, node.or);

        if let Some(or) = or {
            self.set_branch_frozen(or, local, changes);
        }
        if let Some(and) = and {
            self.set_branch_frozen(and, action_unfulfilled, changes);
        }
    }

    fn set_branch_frozen(
        &mut self,
        branch: ConditionId,
        frozen: bool,
        changes: &mut Vec<FulfillmentChange>,
    ) {
        match (self.is_frozen(branch), frozen) {
            (Some(false), true) => self.freeze_subtree(branch),
            (Some(true), false) => self.unfreeze_inner(branch, changes),
            _ => {}
        }
    }

    fn emit_if_changed(&mut self, id: ConditionId, changes: &mut Vec<FulfillmentChange>) {
        let Some(node) = self.node_mut(id) else { return };
        if !node.frozen && node.fulfilled != node.notified {
            node.notified = node.fulfilled;
            changes.push(FulfillmentChange {
                condition: id,
                fulfilled: node.fulfilled,
            });
        }
    }

    /// Freeze a condition, its action and both branches recursively.
    pub fn freeze(&mut self, id: ConditionId) -> FulfillResult<()> {
        self.require(id)?;
        self.freeze_subtree(id);
        Ok(())
    }

    fn freeze_subtree(&mut self, id: ConditionId) {
        for c in self.subtree(id) {
            if let Some(node) = self.node_mut(c) {
                node.frozen = true;
                if let Some(action) = node.action.as_mut() {
                    action.frozen = true;
                }
            }
        }
    }

    /// Unfreeze a condition and report its value if it changed while frozen.
    ///
    /// Branches are re-frozen or unfrozen according to the current local
    /// term and action value.
    pub fn unfreeze(&mut self, id: ConditionId) -> FulfillResult<Vec<FulfillmentChange>> {
        self.require(id)?;
        let mut changes = Vec::new();
        self.unfreeze_inner(id, &mut changes);
        Ok(changes)
    }

    fn unfreeze_inner(&mut self, id: ConditionId, changes: &mut Vec<FulfillmentChange>) {
        let Some(node) = self.node_mut(id) else { return };
        node.frozen = false;
        if let Some(action) = node.action.as_mut() {
            action.frozen = false;
        }
        self.refresh_branch_freeze(id, changes);
        if let Some(value) = self.compute(id) {
            if let Some(node) = self.node_mut(id) {
                node.fulfilled = value;
            }
        }
        self.emit_if_changed(id, changes);
    }

    /// Remove a whole condition tree, clearing every observer registration.
    ///
    /// Returns the removed ids, leaves first.
    pub fn remove_tree(&mut self, root: ConditionId) -> FulfillResult<Vec<ConditionId>> {
        if self.require(root)?.parent.is_some() {
            return Err(FulfillError::NotATreeRoot(root));
        }
        let mut order = self.subtree(root);
        order.reverse();
        for id in &order {
            let slot = &mut self.slots[id.index as usize];
            if let Some(node) = slot.node.take() {
                node.observers.clear();
                for reference in node.action.iter().filter_map(|a| a.kind.reference()) {
                    reference.clear_observers();
                }
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(id.index);
                self.len -= 1;
            }
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(graph: &mut ConditionGraph) -> ConditionId {
        graph
            .add_condition(Some(ActionKind::Manual), None, None)
            .unwrap()
    }

    #[test]
    fn leaf_follows_its_action() {
        let mut g = ConditionGraph::new();
        let c = leaf(&mut g);
        assert_eq!(g.is_fulfilled(c), Some(false));
        let changes = g.set_action_fulfilled(c, true).unwrap();
        assert_eq!(
            changes,
            vec![FulfillmentChange {
                condition: c,
                fulfilled: true
            }]
        );
        assert!(g.set_action_fulfilled(c, true).unwrap().is_empty());
    }

    #[test]
    fn empty_condition_is_rejected() {
        let mut g = ConditionGraph::new();
        assert_eq!(
            g.add_condition(None, None, None).unwrap_err(),
            FulfillError::EmptyCondition
        );
    }

    #[test]
    fn sub_conditions_have_one_owner() {
        let mut g = ConditionGraph::new();
        let a = leaf(&mut g);
        g.add_condition(None, Some(a), None).unwrap();
        assert_eq!(
            g.add_condition(None, None, Some(a)).unwrap_err(),
            FulfillError::AlreadyOwned(a)
        );
        let b = leaf(&mut g);
        assert!(g.add_condition(None, Some(b), Some(b)).is_err());
    }

    #[test]
    fn and_branch_propagates_to_parent() {
        let mut g = ConditionGraph::new();
        let and = leaf(&mut g);
        let root = g
            .add_condition(Some(ActionKind::Manual), Some(and), None)
            .unwrap();

        g.set_action_fulfilled(root, true).unwrap();
        assert_eq!(g.is_fulfilled(root), Some(false));

        let changes = g.set_action_fulfilled(and, true).unwrap();
        assert_eq!(g.is_fulfilled(root), Some(true));
        assert!(changes.contains(&FulfillmentChange {
            condition: root,
            fulfilled: true
        }));
    }

    #[test]
    fn or_branch_is_frozen_while_local_holds() {
        let mut g = ConditionGraph::new();
        let or = leaf(&mut g);
        let root = g
            .add_condition(Some(ActionKind::Manual), None, Some(or))
            .unwrap();
        assert_eq!(g.is_frozen(or), Some(false));

        g.set_action_fulfilled(root, true).unwrap();
        assert_eq!(g.is_frozen(or), Some(true));

        let changes = g.set_action_fulfilled(or, true).unwrap();
        assert!(changes.is_empty());
        assert_eq!(g.is_fulfilled(or), Some(true));

        let changes = g.set_action_fulfilled(root, false).unwrap();
        assert_eq!(g.is_frozen(or), Some(false));
        assert_eq!(g.is_fulfilled(root), Some(true));
        assert_eq!(
            changes,
            vec![FulfillmentChange {
                condition: or,
                fulfilled: true
            }]
        );
    }

    #[test]
    fn and_branch_is_frozen_while_action_unfulfilled() {
        let mut g = ConditionGraph::new();
        let and = leaf(&mut g);
        let root = g
            .add_condition(Some(ActionKind::Manual), Some(and), None)
            .unwrap();
        assert_eq!(g.is_frozen(and), Some(true));
        g.set_action_fulfilled(root, true).unwrap();
        assert_eq!(g.is_frozen(and), Some(false));
    }

    #[test]
    fn freeze_suppresses_and_unfreeze_reports() {
        let mut g = ConditionGraph::new();
        let c = leaf(&mut g);
        g.freeze(c).unwrap();
        assert!(g.action(c).unwrap().is_frozen());

        assert!(g.set_action_fulfilled(c, true).unwrap().is_empty());
        assert_eq!(g.is_fulfilled(c), Some(true));

        let changes = g.unfreeze(c).unwrap();
        assert_eq!(
            changes,
            vec![FulfillmentChange {
                condition: c,
                fulfilled: true
            }]
        );
        assert!(g.unfreeze(c).unwrap().is_empty());
    }

    #[test]
    fn unfreeze_without_net_change_is_silent() {
        let mut g = ConditionGraph::new();
        let c = leaf(&mut g);
        g.freeze(c).unwrap();
        g.set_action_fulfilled(c, true).unwrap();
        g.set_action_fulfilled(c, false).unwrap();
        assert!(g.unfreeze(c).unwrap().is_empty());
    }

    #[test]
    fn remove_tree_invalidates_handles() {
        let mut g = ConditionGraph::new();
        let a = leaf(&mut g);
        let root = g.add_condition(None, Some(a), None).unwrap();
        assert_eq!(g.remove_tree(a).unwrap_err(), FulfillError::NotATreeRoot(a));

        let observers = g.observers(root).unwrap();
        observers.subscribe(|_| {});
        let removed = g.remove_tree(root).unwrap();
        assert_eq!(removed, vec![a, root]);
        assert!(g.is_empty());
        assert!(observers.is_empty());
        assert_eq!(
            g.set_action_fulfilled(a, true).unwrap_err(),
            FulfillError::UnknownCondition(a)
        );
        let reused = leaf(&mut g);
        assert!(!g.contains(a) && !g.contains(root));
        assert!(g.contains(reused));
    }

    #[test]
    fn references_lists_resolvable_actions() {
        let mut g = ConditionGraph::new();
        let reference = Arc::new(ResolvableReference::node("core.a.b.c"));
        let dep = g
            .add_condition(
                Some(ActionKind::AchievementCompleted {
                    achievement: Arc::clone(&reference),
                }),
                None,
                None,
            )
            .unwrap();
        let root = g
            .add_condition(Some(ActionKind::Map { map_id: 1 }), None, Some(dep))
            .unwrap();
        let refs = g.references(root);
        assert_eq!(refs.len(), 1);
        assert!(Arc::ptr_eq(&refs[0], &reference));
    }
}
