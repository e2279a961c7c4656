//! # Identifiers and Namespaces
//!
//! Every hierarchy object carries a local id that is unique among its
//! siblings. Dot-joining the ids from a root down to a node yields the
//! node's full name, which doubles as its global address.
//!
//! Root ids are namespaces and may themselves contain the separator
//! (`community.daily`). Non-root ids are single segments.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HierarchyError;

/// Separator between full-name segments.
pub const SEPARATOR: char = '.';

/// A validated single-segment identifier.
///
/// Allowed characters: ASCII letters, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalId(String);

impl LocalId {
    /// Validate and wrap a local id.
    pub fn new(id: impl Into<String>) -> Result<Self, HierarchyError> {
        let id = id.into();
        validate_segment(&id)?;
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for LocalId {
    type Error = HierarchyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocalId> for String {
    fn from(id: LocalId) -> Self {
        id.0
    }
}

impl AsRef<str> for LocalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Check a single full-name segment.
pub fn validate_segment(segment: &str) -> Result<(), HierarchyError> {
    if segment.is_empty() {
        return Err(HierarchyError::InvalidId {
            id: segment.to_string(),
            reason: "identifier must not be empty".to_string(),
        });
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(HierarchyError::InvalidId {
            id: segment.to_string(),
            reason: format!("character {c:?} is not allowed"),
        });
    }
    Ok(())
}

/// Check a namespace: one or more valid segments joined by [`SEPARATOR`].
pub fn validate_namespace(namespace: &str) -> Result<(), HierarchyError> {
    if namespace.is_empty() {
        return Err(HierarchyError::InvalidId {
            id: namespace.to_string(),
            reason: "namespace must not be empty".to_string(),
        });
    }
    namespace.split(SEPARATOR).try_for_each(validate_segment)
}

/// Join a parent full name and a child id.
pub fn join(parent: &str, id: &str) -> String {
    let mut name = String::with_capacity(parent.len() + id.len() + 1);
    name.push_str(parent);
    name.push(SEPARATOR);
    name.push_str(id);
    name
}

/// Whether `namespace` addresses `target` or one of its ancestors.
///
/// Matching is segment-aware: `core` is a namespace parent of `core` and
/// `core.daily`, but not of `corex.daily`.
pub fn is_namespace_parent(namespace: &str, target: &str) -> bool {
    match target.strip_prefix(namespace) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// Whether two namespaces overlap (either is a namespace parent of the other).
pub fn namespaces_overlap(a: &str, b: &str) -> bool {
    is_namespace_parent(a, b) || is_namespace_parent(b, a)
}

/// Strip `namespace` and the following separator from `target`.
///
/// Returns `Some("")` when both are equal and `None` when `namespace` is not
/// a namespace parent of `target`.
pub fn relative_to<'a>(namespace: &str, target: &'a str) -> Option<&'a str> {
    let rest = target.strip_prefix(namespace)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix(SEPARATOR)
    }
}

/// Qualify a reference written in a data file.
///
/// References that start with the separator are relative to the pack
/// namespace (`.cat.coll.ach`); anything else is already a full name.
pub fn qualify(namespace: &str, reference: &str) -> String {
    match reference.strip_prefix(SEPARATOR) {
        Some(relative) => join(namespace, relative),
        None => reference.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_id_rejects_separator() {
        assert!(LocalId::new("a.b").is_err());
        assert!(LocalId::new("").is_err());
        assert!(LocalId::new("daily_5-x").is_ok());
    }

    #[test]
    fn local_id_deserializes_with_validation() {
        let ok: LocalId = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(ok.as_str(), "weekly");
        assert!(serde_json::from_str::<LocalId>("\"has space\"").is_err());
    }

    #[test]
    fn namespace_validation() {
        assert!(validate_namespace("community.daily").is_ok());
        assert!(validate_namespace("community..daily").is_err());
        assert!(validate_namespace("").is_err());
    }

    #[test]
    fn namespace_parent_is_segment_aware() {
        assert!(is_namespace_parent("core", "core"));
        assert!(is_namespace_parent("core", "core.daily"));
        assert!(!is_namespace_parent("core", "corex.daily"));
        assert!(!is_namespace_parent("core.daily", "core"));
    }

    #[test]
    fn overlap_is_symmetric() {
        assert!(namespaces_overlap("a", "a.b"));
        assert!(namespaces_overlap("a.b", "a"));
        assert!(!namespaces_overlap("a", "ab"));
    }

    #[test]
    fn relative_paths() {
        assert_eq!(relative_to("core", "core"), Some(""));
        assert_eq!(relative_to("core", "core.x.y"), Some("x.y"));
        assert_eq!(relative_to("core", "corex"), None);
    }

    #[test]
    fn qualify_relative_reference() {
        assert_eq!(qualify("core", ".cat.ach"), "core.cat.ach");
        assert_eq!(qualify("core", "other.cat"), "other.cat");
    }
}
