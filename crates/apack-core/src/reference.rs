//! # Resolvable References
//!
//! A reference is created at parse time holding only the id string written
//! in the data file. The resolver binds it exactly once to a live target.
//! Observers subscribed before binding are notified synchronously by the
//! binding call.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;
use crate::hierarchy::NodeId;
use crate::observer::{Observers, SubscriptionId};

/// What a reference points at. Selects which resolve context can bind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Another hierarchy object, addressed by full name.
    Hierarchy,
    /// A file inside a pack's resource area, addressed by relative path.
    Asset,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hierarchy => "hierarchy",
            Self::Asset => "asset",
        })
    }
}

/// Normalized path of a resource, relative to the pack's resource area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetPath(String);

impl AssetPath {
    /// Normalize separators and strip leading `./` and `/`.
    pub fn new(path: impl AsRef<str>) -> Self {
        let normalized = path.as_ref().replace('\\', "/");
        let mut trimmed = normalized.as_str();
        loop {
            if let Some(rest) = trimmed.strip_prefix("./") {
                trimmed = rest;
            } else if let Some(rest) = trimmed.strip_prefix('/') {
                trimmed = rest;
            } else {
                break;
            }
        }
        Self(trimmed.to_string())
    }

    /// The normalized path.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The live object a reference was bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    /// A hierarchy node.
    Node(NodeId),
    /// An existing resource.
    Asset(AssetPath),
}

impl ResolvedTarget {
    /// The kind of reference this target satisfies.
    pub fn kind(&self) -> ReferenceKind {
        match self {
            Self::Node(_) => ReferenceKind::Hierarchy,
            Self::Asset(_) => ReferenceKind::Asset,
        }
    }
}

/// A deferred link from one object to another, bound once by a resolver.
#[derive(Debug)]
pub struct ResolvableReference {
    kind: ReferenceKind,
    reference_id: String,
    resolved: OnceLock<ResolvedTarget>,
    observers: Observers<ResolvedTarget>,
}

impl ResolvableReference {
    /// Create an unresolved reference.
    pub fn new(kind: ReferenceKind, reference_id: impl Into<String>) -> Self {
        Self {
            kind,
            reference_id: reference_id.into(),
            resolved: OnceLock::new(),
            observers: Observers::new(),
        }
    }

    /// Unresolved reference to a hierarchy object.
    pub fn node(reference_id: impl Into<String>) -> Self {
        Self::new(ReferenceKind::Hierarchy, reference_id)
    }

    /// Unresolved reference to a resource.
    pub fn asset(path: impl AsRef<str>) -> Self {
        Self::new(ReferenceKind::Asset, AssetPath::new(path).0)
    }

    /// The kind of target this reference expects.
    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    /// The id as written (after namespace qualification).
    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    /// The bound target, if any.
    pub fn resolved(&self) -> Option<&ResolvedTarget> {
        self.resolved.get()
    }

    /// Whether the reference has been bound.
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    /// The bound hierarchy node, if this is a resolved node reference.
    pub fn resolved_node(&self) -> Option<NodeId> {
        match self.resolved.get()? {
            ResolvedTarget::Node(node) => Some(*node),
            ResolvedTarget::Asset(_) => None,
        }
    }

    /// The bound asset, if this is a resolved asset reference.
    pub fn resolved_asset(&self) -> Option<&AssetPath> {
        match self.resolved.get()? {
            ResolvedTarget::Asset(path) => Some(path),
            ResolvedTarget::Node(_) => None,
        }
    }

    /// Subscribe to the binding notification.
    pub fn on_resolved<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&ResolvedTarget) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    /// Remove a binding subscription.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Bind the reference. Fails on kind mismatch or if already bound.
    pub fn bind(&self, target: ResolvedTarget) -> Result<(), ResolveError> {
        if target.kind() != self.kind {
            return Err(ResolveError::KindMismatch {
                reference_id: self.reference_id.clone(),
                expected: self.kind,
            });
        }
        self.resolved
            .set(target.clone())
            .map_err(|_| ResolveError::AlreadyResolved {
                reference_id: self.reference_id.clone(),
            })?;
        self.observers.notify(&target);
        Ok(())
    }

    /// Drop every observer. Part of the dispose contract.
    pub fn clear_observers(&self) {
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Hierarchy;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn some_node() -> NodeId {
        let mut h: Hierarchy<()> = Hierarchy::new();
        h.create_root("x", ()).unwrap()
    }

    #[test]
    fn asset_paths_are_normalized() {
        assert_eq!(AssetPath::new("./icons\\a.png").as_str(), "icons/a.png");
        assert_eq!(AssetPath::new("/icons/a.png").as_str(), "icons/a.png");
    }

    #[test]
    fn bind_notifies_observers_once() {
        let reference = ResolvableReference::node("core.events.daily");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        reference.on_resolved(move |target| s.lock().push(target.clone()));

        let node = some_node();
        reference.bind(ResolvedTarget::Node(node)).unwrap();
        assert!(reference.is_resolved());
        assert_eq!(reference.resolved_node(), Some(node));
        assert_eq!(seen.lock().len(), 1);

        let again = reference.bind(ResolvedTarget::Node(node));
        assert!(matches!(again, Err(ResolveError::AlreadyResolved { .. })));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn kind_mismatch_is_rejected() {
        let reference = ResolvableReference::asset("icons/a.png");
        let err = reference.bind(ResolvedTarget::Node(some_node())).unwrap_err();
        assert!(matches!(err, ResolveError::KindMismatch { .. }));
        assert!(!reference.is_resolved());
    }

    #[test]
    fn cleared_observers_are_not_called() {
        let reference = ResolvableReference::asset("a.png");
        let seen = Arc::new(Mutex::new(0));
        let s = Arc::clone(&seen);
        reference.on_resolved(move |_| *s.lock() += 1);
        reference.clear_observers();
        reference
            .bind(ResolvedTarget::Asset(AssetPath::new("a.png")))
            .unwrap();
        assert_eq!(*seen.lock(), 0);
        assert_eq!(reference.resolved_asset().unwrap().as_str(), "a.png");
    }
}
