//! # Shared Graph Handle
//!
//! Wraps a [`ConditionGraph`] behind a `parking_lot::RwLock` and dispatches
//! fulfillment changes to per-condition observers after the lock has been
//! released, so observers may read the graph.

use std::sync::Arc;

use apack_core::SubscriptionId;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{FulfillError, FulfillResult};
use crate::graph::{ConditionGraph, ConditionId, FulfillmentChange};

/// Cloneable handle to a lock-protected condition graph.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    inner: Arc<RwLock<ConditionGraph>>,
}

impl SharedGraph {
    /// Wrap an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access. Do not hold across dispatch.
    pub fn read(&self) -> RwLockReadGuard<'_, ConditionGraph> {
        self.inner.read()
    }

    /// Write access. Changes returned by graph methods must be passed to
    /// [`dispatch`](Self::dispatch) once the guard is dropped.
    pub fn write(&self) -> RwLockWriteGuard<'_, ConditionGraph> {
        self.inner.write()
    }

    /// Subscribe to changes of one condition.
    pub fn subscribe<F>(&self, id: ConditionId, callback: F) -> FulfillResult<SubscriptionId>
    where
        F: Fn(&FulfillmentChange) + Send + Sync + 'static,
    {
        let observers = self
            .read()
            .observers(id)
            .ok_or(FulfillError::UnknownCondition(id))?;
        Ok(observers.subscribe(callback))
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: ConditionId, subscription: SubscriptionId) -> bool {
        self.read()
            .observers(id)
            .is_some_and(|observers| observers.unsubscribe(subscription))
    }

    /// Set an action value, then dispatch the resulting changes.
    pub fn set_action_fulfilled(
        &self,
        id: ConditionId,
        fulfilled: bool,
    ) -> FulfillResult<Vec<FulfillmentChange>> {
        let changes = self.write().set_action_fulfilled(id, fulfilled)?;
        self.dispatch(&changes);
        Ok(changes)
    }

    /// Freeze a condition tree.
    pub fn freeze(&self, id: ConditionId) -> FulfillResult<()> {
        self.write().freeze(id)
    }

    /// Unfreeze a condition, then dispatch the resulting changes.
    pub fn unfreeze(&self, id: ConditionId) -> FulfillResult<Vec<FulfillmentChange>> {
        let changes = self.write().unfreeze(id)?;
        self.dispatch(&changes);
        Ok(changes)
    }

    /// Notify observers of each change. Removed conditions are skipped.
    pub fn dispatch(&self, changes: &[FulfillmentChange]) {
        if changes.is_empty() {
            return;
        }
        let targets: Vec<_> = {
            let graph = self.read();
            changes
                .iter()
                .filter_map(|change| graph.observers(change.condition).map(|o| (o, *change)))
                .collect()
        };
        for (observers, change) in targets {
            observers.notify(&change);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionKind;
    use parking_lot::Mutex;

    #[test]
    fn observers_run_without_the_graph_lock() {
        let graph = SharedGraph::new();
        let c = graph
            .write()
            .add_condition(Some(ActionKind::Manual), None, None)
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let (g, s) = (graph.clone(), Arc::clone(&seen));
        graph
            .subscribe(c, move |change| {
                let current = g.read().is_fulfilled(change.condition);
                s.lock().push((change.fulfilled, current));
            })
            .unwrap();

        graph.set_action_fulfilled(c, true).unwrap();
        assert_eq!(*seen.lock(), vec![(true, Some(true))]);
    }

    #[test]
    fn removed_condition_notifications_are_no_ops() {
        let graph = SharedGraph::new();
        let c = graph
            .write()
            .add_condition(Some(ActionKind::Manual), None, None)
            .unwrap();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        let sub = graph.subscribe(c, move |_| *h.lock() += 1).unwrap();

        graph.write().remove_tree(c).unwrap();
        graph.dispatch(&[FulfillmentChange {
            condition: c,
            fulfilled: true,
        }]);
        assert_eq!(*hits.lock(), 0);
        assert!(!graph.unsubscribe(c, sub));
        assert!(graph.set_action_fulfilled(c, true).is_err());
    }
}
