//! # Action Check Context
//!
//! Registry mapping action discriminators to predicates supplied by the
//! consumer (a game client, a test harness). Unregistered kinds are never
//! met; checking never fails.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::action::ActionKind;
use crate::error::{FulfillError, FulfillResult};

type Checker = Arc<dyn Fn(&ActionKind) -> bool + Send + Sync>;

/// Kind → predicate registry.
#[derive(Default)]
pub struct ActionCheckContext {
    checkers: RwLock<HashMap<String, Checker>>,
}

impl fmt::Debug for ActionCheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCheckContext")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ActionCheckContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a checker is registered for `kind`.
    pub fn can_check(&self, kind: &str) -> bool {
        self.checkers.read().contains_key(kind)
    }

    /// Evaluate `action` with the checker registered for its kind.
    pub fn is_met(&self, action: &ActionKind) -> bool {
        let checker = self.checkers.read().get(action.discriminator()).cloned();
        checker.is_some_and(|check| check(action))
    }

    /// Register a checker.
    pub fn add<F>(&self, kind: impl Into<String>, checker: F) -> FulfillResult<()>
    where
        F: Fn(&ActionKind) -> bool + Send + Sync + 'static,
    {
        let kind = kind.into();
        let mut checkers = self.checkers.write();
        if checkers.contains_key(&kind) {
            return Err(FulfillError::CheckerExists { kind });
        }
        tracing::debug!(kind = %kind, "registered action checker");
        checkers.insert(kind, Arc::new(checker));
        Ok(())
    }

    /// Remove a checker. Returns whether one was registered.
    pub fn remove(&self, kind: &str) -> bool {
        self.checkers.write().remove(kind).is_some()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.checkers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }
}
