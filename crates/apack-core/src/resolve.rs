//! # Resolve Contexts
//!
//! Turns reference ids into live targets.
//!
//! - [`HierarchyResolveContext`] keeps a registry of root objects and
//!   resolves full names by namespace matching and a segment walk.
//! - [`ResolveContextCollection`] composes several contexts. It tries each
//!   context able to resolve a kind in registration order; the first
//!   success wins.
//!
//! ## Resolution Algorithm
//!
//! ```text
//! target = "community.daily.events.first"
//! roots  = ["core", "community.daily"]
//!
//! 1. candidates: roots whose full name is a namespace parent of target
//!                → ["community.daily"]
//! 2. exact match?  no
//! 3. remainder     "events.first" → walk children "events", then "first"
//! ```
//!
//! ## Locking
//!
//! Contexts take the hierarchy read lock internally. Never call
//! [`HierarchyResolveContext::add`] or any resolve method while holding
//! the hierarchy write lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{RegistrationError, ResolveError};
use crate::hierarchy::{Hierarchy, NodeId};
use crate::identity;
use crate::reference::{ReferenceKind, ResolvableReference, ResolvedTarget};

/// A capability that can bind references of some kinds.
pub trait ResolveContext: Send + Sync {
    /// Whether this context handles references of `kind`.
    fn can_resolve(&self, kind: ReferenceKind) -> bool;

    /// Resolve `reference_id` to a live target.
    fn resolve(&self, kind: ReferenceKind, reference_id: &str)
        -> Result<ResolvedTarget, ResolveError>;
}

/// Registry of hierarchy roots resolving references by full name.
pub struct HierarchyResolveContext<T> {
    hierarchy: Arc<RwLock<Hierarchy<T>>>,
    roots: RwLock<Vec<NodeId>>,
}

impl<T> fmt::Debug for HierarchyResolveContext<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HierarchyResolveContext")
            .field("roots", &*self.roots.read())
            .finish()
    }
}

impl<T> HierarchyResolveContext<T> {
    /// Create a context over a shared hierarchy.
    pub fn new(hierarchy: Arc<RwLock<Hierarchy<T>>>) -> Self {
        Self {
            hierarchy,
            roots: RwLock::new(Vec::new()),
        }
    }

    /// The hierarchy this context resolves against.
    pub fn hierarchy(&self) -> &Arc<RwLock<Hierarchy<T>>> {
        &self.hierarchy
    }

    /// Register a root object.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::NotARoot`] if the candidate has a parent.
    /// - [`RegistrationError::AlreadyRegistered`] if it is registered.
    /// - [`RegistrationError::NamespaceCollision`] if its namespace is a
    ///   prefix of, or prefixed by, a registered namespace.
    pub fn add(&self, root: NodeId) -> Result<(), RegistrationError> {
        let mut roots = self.roots.write();
        let hierarchy = self.hierarchy.read();

        let node = hierarchy
            .get(root)
            .ok_or_else(|| crate::error::HierarchyError::UnknownNode(root.to_string()))?;
        let candidate = node.id().to_string();
        if !node.is_root() {
            let name = hierarchy.full_name(root).unwrap_or(candidate);
            return Err(RegistrationError::NotARoot(name));
        }
        if roots.contains(&root) {
            return Err(RegistrationError::AlreadyRegistered(candidate));
        }
        for existing in roots.iter().filter_map(|r| hierarchy.get(*r)) {
            if identity::namespaces_overlap(existing.id(), &candidate) {
                return Err(RegistrationError::NamespaceCollision {
                    candidate,
                    existing: existing.id().to_string(),
                });
            }
        }

        tracing::debug!(namespace = %candidate, "registered hierarchy root");
        roots.push(root);
        Ok(())
    }

    /// Unregister a root. Returns whether it was registered.
    pub fn remove(&self, root: NodeId) -> bool {
        let mut roots = self.roots.write();
        let before = roots.len();
        roots.retain(|r| *r != root);
        roots.len() != before
    }

    /// Whether `root` is registered.
    pub fn is_registered(&self, root: NodeId) -> bool {
        self.roots.read().contains(&root)
    }

    /// Registered roots in registration order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.roots.read().clone()
    }

    /// Resolve a full name to a live node.
    pub fn resolve_node(&self, reference_id: &str) -> Result<NodeId, ResolveError> {
        let roots = self.roots.read().clone();
        let hierarchy = self.hierarchy.read();

        let mut furthest: Option<String> = None;
        let mut matched_any = false;
        for root in roots {
            let Some(node) = hierarchy.get(root) else {
                continue;
            };
            let Some(remainder) = identity::relative_to(node.id(), reference_id) else {
                continue;
            };
            matched_any = true;
            match hierarchy.walk(root, remainder) {
                Ok(found) => return Ok(found),
                Err(segment) => furthest = furthest.or_else(|| Some(segment.to_string())),
            }
        }

        if matched_any {
            Err(ResolveError::NotFound {
                reference_id: reference_id.to_string(),
                segment: furthest.unwrap_or_default(),
            })
        } else {
            Err(ResolveError::NoMatchingNamespace {
                reference_id: reference_id.to_string(),
            })
        }
    }

    /// Non-failing variant of [`resolve_node`](Self::resolve_node).
    pub fn try_resolve(&self, reference_id: &str) -> Option<NodeId> {
        self.resolve_node(reference_id).ok()
    }
}

impl<T: Send + Sync> ResolveContext for HierarchyResolveContext<T> {
    fn can_resolve(&self, kind: ReferenceKind) -> bool {
        kind == ReferenceKind::Hierarchy
    }

    fn resolve(
        &self,
        kind: ReferenceKind,
        reference_id: &str,
    ) -> Result<ResolvedTarget, ResolveError> {
        if !self.can_resolve(kind) {
            return Err(ResolveError::NoContext {
                kind,
                reference_id: reference_id.to_string(),
            });
        }
        self.resolve_node(reference_id).map(ResolvedTarget::Node)
    }
}

/// Ordered composition of resolve contexts.
#[derive(Clone, Default)]
pub struct ResolveContextCollection {
    contexts: Vec<Arc<dyn ResolveContext>>,
}

impl fmt::Debug for ResolveContextCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveContextCollection")
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

impl ResolveContextCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a context (builder style).
    pub fn with(mut self, context: Arc<dyn ResolveContext>) -> Self {
        self.contexts.push(context);
        self
    }

    /// Append a context.
    pub fn push(&mut self, context: Arc<dyn ResolveContext>) {
        self.contexts.push(context);
    }

    /// Number of contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Resolve and bind `reference`. Already-bound references are left as is.
    pub fn resolve_reference(&self, reference: &ResolvableReference) -> Result<(), ResolveError> {
        if reference.is_resolved() {
            return Ok(());
        }
        let target = self.resolve(reference.kind(), reference.reference_id())?;
        reference.bind(target)
    }
}

impl ResolveContext for ResolveContextCollection {
    fn can_resolve(&self, kind: ReferenceKind) -> bool {
        self.contexts.iter().any(|c| c.can_resolve(kind))
    }

    fn resolve(
        &self,
        kind: ReferenceKind,
        reference_id: &str,
    ) -> Result<ResolvedTarget, ResolveError> {
        let mut last_error = None;
        for context in self.contexts.iter().filter(|c| c.can_resolve(kind)) {
            match context.resolve(kind, reference_id) {
                Ok(target) => return Ok(target),
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error.unwrap_or_else(|| ResolveError::NoContext {
            kind,
            reference_id: reference_id.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::AssetPath;

    fn context() -> (HierarchyResolveContext<()>, NodeId, NodeId, NodeId) {
        let hierarchy = Arc::new(RwLock::new(Hierarchy::new()));
        let (root, other, leaf) = {
            let mut h = hierarchy.write();
            let root = h.create_root("community.daily", ()).unwrap();
            let cat = h.create_child(root, "events", ()).unwrap();
            let leaf = h.create_child(cat, "first", ()).unwrap();
            let other = h.create_root("core", ()).unwrap();
            (root, other, leaf)
        };
        let ctx = HierarchyResolveContext::new(hierarchy);
        ctx.add(root).unwrap();
        ctx.add(other).unwrap();
        (ctx, root, other, leaf)
    }

    #[test]
    fn resolves_exact_root_and_descendants() {
        let (ctx, root, other, leaf) = context();
        assert_eq!(ctx.resolve_node("community.daily").unwrap(), root);
        assert_eq!(ctx.resolve_node("core").unwrap(), other);
        assert_eq!(ctx.resolve_node("community.daily.events.first").unwrap(), leaf);
    }

    #[test]
    fn unknown_namespace_and_missing_path_are_distinct() {
        let (ctx, ..) = context();
        assert!(matches!(
            ctx.resolve_node("elsewhere.events"),
            Err(ResolveError::NoMatchingNamespace { .. })
        ));
        match ctx.resolve_node("community.daily.events.second") {
            Err(ResolveError::NotFound { segment, .. }) => assert_eq!(segment, "second"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(ctx.try_resolve("community").is_none());
    }

    #[test]
    fn add_rejects_non_roots_duplicates_and_collisions() {
        let (ctx, root, _, leaf) = context();
        assert!(matches!(ctx.add(leaf), Err(RegistrationError::NotARoot(_))));
        assert!(matches!(
            ctx.add(root),
            Err(RegistrationError::AlreadyRegistered(_))
        ));

        let (prefix, extended, sibling) = {
            let mut h = ctx.hierarchy().write();
            (
                h.create_root("community", ()).unwrap(),
                h.create_root("core.extra", ()).unwrap(),
                h.create_root("corex", ()).unwrap(),
            )
        };
        assert!(matches!(
            ctx.add(prefix),
            Err(RegistrationError::NamespaceCollision { .. })
        ));
        assert!(matches!(
            ctx.add(extended),
            Err(RegistrationError::NamespaceCollision { .. })
        ));
        ctx.add(sibling).unwrap();
    }

    #[test]
    fn removed_roots_no_longer_resolve() {
        let (ctx, root, ..) = context();
        assert!(ctx.remove(root));
        assert!(!ctx.remove(root));
        assert!(ctx.try_resolve("community.daily.events.first").is_none());
    }

    #[test]
    fn disposed_roots_are_skipped() {
        let (ctx, root, ..) = context();
        ctx.hierarchy().write().dispose(root);
        assert!(ctx.try_resolve("community.daily").is_none());
    }

    struct Assets;

    impl ResolveContext for Assets {
        fn can_resolve(&self, kind: ReferenceKind) -> bool {
            kind == ReferenceKind::Asset
        }

        fn resolve(
            &self,
            _kind: ReferenceKind,
            reference_id: &str,
        ) -> Result<ResolvedTarget, ResolveError> {
            if reference_id.ends_with(".png") {
                Ok(ResolvedTarget::Asset(AssetPath::new(reference_id)))
            } else {
                Err(ResolveError::MissingAsset {
                    reference_id: reference_id.to_string(),
                })
            }
        }
    }

    #[test]
    fn collection_dispatches_by_kind() {
        let (ctx, _, _, leaf) = context();
        let collection = ResolveContextCollection::new()
            .with(Arc::new(ctx))
            .with(Arc::new(Assets));

        let node_ref = ResolvableReference::node("community.daily.events.first");
        collection.resolve_reference(&node_ref).unwrap();
        assert_eq!(node_ref.resolved_node(), Some(leaf));

        let asset_ref = ResolvableReference::asset("icons/a.png");
        collection.resolve_reference(&asset_ref).unwrap();
        assert!(asset_ref.is_resolved());

        let missing = ResolvableReference::asset("icons/a.txt");
        assert!(matches!(
            collection.resolve_reference(&missing),
            Err(ResolveError::MissingAsset { .. })
        ));
    }

    #[test]
    fn collection_without_capable_context_fails() {
        let collection = ResolveContextCollection::new().with(Arc::new(Assets));
        assert!(!collection.can_resolve(ReferenceKind::Hierarchy));
        assert!(matches!(
            collection.resolve(ReferenceKind::Hierarchy, "core"),
            Err(ResolveError::NoContext { .. })
        ));
    }
}
