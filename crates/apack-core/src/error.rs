//! # Error Types: Structured Error Hierarchy
//!
//! Defines the error types shared by every pack crate. All errors use
//! `thiserror` for derive-based `Display` and `Error` implementations.
//!
//! ## Design
//!
//! - Hierarchy errors carry the offending id and the parent full name.
//! - Resolve errors carry the reference id exactly as it was written.
//! - Internal errors signal a broken invariant inside this library and are
//!   kept apart from content errors so callers can tell "bad pack" from
//!   "bug in the loader".

use thiserror::Error;

use crate::reference::ReferenceKind;

/// Errors raised while building or mutating a [`Hierarchy`](crate::Hierarchy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HierarchyError {
    /// An identifier is empty or contains forbidden characters.
    #[error("invalid identifier {id:?}: {reason}")]
    InvalidId {
        /// The rejected identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A sibling with the same id already exists under the parent.
    #[error("duplicate id {id:?} under {parent}")]
    DuplicateSibling {
        /// The duplicated local id.
        id: String,
        /// Full name of the parent.
        parent: String,
    },

    /// The node handle refers to a disposed or unknown slot.
    #[error("node {0} does not exist")]
    UnknownNode(String),

    /// The node was expected to be a root but has a parent.
    #[error("node {0} already has a parent")]
    AlreadyAttached(String),

    /// Attaching would make a node its own ancestor.
    #[error("attaching {child} under {parent} would create a cycle")]
    Cycle {
        /// Full name of the node being attached.
        child: String,
        /// Full name of the intended parent.
        parent: String,
    },
}

/// Errors raised by resolve contexts and reference binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No registered root namespace is a prefix of the reference id.
    #[error("no registered namespace matches reference {reference_id:?}")]
    NoMatchingNamespace {
        /// The reference being resolved.
        reference_id: String,
    },

    /// A namespace matched, but the remaining path does not exist.
    #[error("reference {reference_id:?} not found (stopped at segment {segment:?})")]
    NotFound {
        /// The reference being resolved.
        reference_id: String,
        /// The first path segment that could not be matched.
        segment: String,
    },

    /// No context in a collection is able to resolve this kind.
    #[error("no resolve context can resolve {kind} reference {reference_id:?}")]
    NoContext {
        /// Kind of the reference.
        kind: ReferenceKind,
        /// The reference being resolved.
        reference_id: String,
    },

    /// An asset reference points at a missing resource.
    #[error("asset {reference_id:?} does not exist")]
    MissingAsset {
        /// The asset path.
        reference_id: String,
    },

    /// A pack depends on a namespace that is not registered.
    #[error("dependency namespace {namespace:?} is not loaded")]
    MissingDependency {
        /// The missing namespace.
        namespace: String,
    },

    /// The resolved target kind does not match the reference kind.
    #[error("reference {reference_id:?} expected a {expected} target")]
    KindMismatch {
        /// The reference being bound.
        reference_id: String,
        /// Kind the reference declares.
        expected: ReferenceKind,
    },

    /// The reference was already bound.
    #[error("reference {reference_id:?} is already resolved")]
    AlreadyResolved {
        /// The reference id.
        reference_id: String,
    },
}

/// Errors raised when registering roots in a hierarchy resolve context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The candidate has a parent and therefore is not a root.
    #[error("{0} is not a root object")]
    NotARoot(String),

    /// The candidate is already registered.
    #[error("{0} is already registered")]
    AlreadyRegistered(String),

    /// The candidate's namespace overlaps a registered namespace.
    #[error("namespace {candidate:?} collides with registered namespace {existing:?}")]
    NamespaceCollision {
        /// Namespace being registered.
        candidate: String,
        /// Namespace already present.
        existing: String,
    },

    /// The candidate handle does not exist.
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

/// A broken invariant inside the library.
///
/// Never caused by pack content. Callers should report these as bugs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("internal error: {0}")]
pub struct InternalError(pub String);

impl InternalError {
    /// Build an internal error from any displayable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_sibling_display() {
        let err = HierarchyError::DuplicateSibling {
            id: "daily".into(),
            parent: "core.events".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("daily"));
        assert!(msg.contains("core.events"));
    }

    #[test]
    fn not_found_names_segment() {
        let err = ResolveError::NotFound {
            reference_id: "core.events.weekly".into(),
            segment: "weekly".into(),
        };
        assert!(format!("{err}").contains("\"weekly\""));
    }

    #[test]
    fn registration_wraps_hierarchy_error() {
        let err = RegistrationError::from(HierarchyError::UnknownNode("#3".into()));
        assert!(format!("{err}").contains("#3"));
    }

    #[test]
    fn internal_error_is_prefixed() {
        assert_eq!(
            InternalError::new("slot vanished").to_string(),
            "internal error: slot vanished"
        );
    }
}
