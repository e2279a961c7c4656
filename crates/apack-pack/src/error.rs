//! Pack-specific error types.
//!
//! Structured errors for manifest registration, data parsing, content
//! reading, resource loading and the pack lifecycle. Errors carry the
//! path or full name of the offending object so a report can point at it.
//!
//! Fatal classes abort a load (`ManifestError`, `FormatError`,
//! `ResolveError`); `ResourceError`s are aggregated and the pack still
//! loads. `InternalError` is kept apart so "bad pack" never looks like
//! "loader bug".

use apack_core::{HierarchyError, InternalError, RegistrationError, ResolveError};
use apack_fulfill::FulfillError;
use apack_state::{LifecycleError, PackState};
use thiserror::Error;

/// `manifest.json` could not be accepted.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// No manifest at the archive root.
    #[error("manifest not found: {path}")]
    Missing {
        /// Where it was looked for.
        path: String,
    },

    /// The manifest is not valid JSON or misses fields.
    #[error("malformed manifest at {path}: {reason}")]
    Malformed {
        /// Manifest location.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// The format version is not supported by this loader.
    #[error("unsupported manifest format version {found} (supported: {supported})")]
    UnsupportedFormat {
        /// Version found in the manifest.
        found: u32,
        /// Version this loader understands.
        supported: u32,
    },

    /// The pack version is not a semantic version.
    #[error("invalid pack version {version:?}: {reason}")]
    InvalidVersion {
        /// The rejected version string.
        version: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A required text field is empty.
    #[error("manifest field {field:?} must not be empty")]
    EmptyField {
        /// The field name.
        field: &'static str,
    },

    /// The namespace is not a valid dot-separated id.
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        /// The rejected namespace.
        namespace: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Malformed or structurally invalid data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// A data file could not be decoded.
    #[error("failed to parse {format} at {path}: {reason}")]
    Parse {
        /// File path inside the pack.
        path: String,
        /// `JSON` or `YAML`.
        format: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// The file extension is not a supported data format.
    #[error("unsupported data file {path}")]
    UnsupportedFile {
        /// File path inside the pack.
        path: String,
    },

    /// An object violates a structural rule.
    #[error("{path}: {object}: {reason}")]
    Invalid {
        /// File path inside the pack.
        path: String,
        /// Full name of the offending object.
        object: String,
        /// What is wrong.
        reason: String,
    },

    /// An action could not be decoded.
    #[error("{path}: {object}: {source}")]
    Action {
        /// File path inside the pack.
        path: String,
        /// Full name of the owning objective.
        object: String,
        /// Decoder error.
        source: FulfillError,
    },

    /// Two objects share a full name.
    #[error("{path}: duplicate object {object}")]
    Duplicate {
        /// File path of the second definition.
        path: String,
        /// The duplicated full name.
        object: String,
    },

    /// The hierarchy rejected a link while attaching.
    #[error("cannot attach {object}: {source}")]
    Attach {
        /// Full name being attached.
        object: String,
        /// Hierarchy error.
        source: HierarchyError,
    },
}

/// Reading from a content reader failed.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The file does not exist.
    #[error("file not found: {path}")]
    NotFound {
        /// Requested path.
        path: String,
    },

    /// The path leaves the reader's root.
    #[error("path {path:?} escapes the content root")]
    Escapes {
        /// Requested path.
        path: String,
    },

    /// I/O failure.
    #[error("I/O error reading {path}: {source}")]
    Io {
        /// Requested path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A blocking read task failed.
    #[error("read task for {path} failed: {reason}")]
    Task {
        /// Requested path.
        path: String,
        /// Join error message.
        reason: String,
    },
}

/// A resource could not be loaded. Non-fatal.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The referenced resource does not exist.
    #[error("resource {path} referenced by {owner} does not exist")]
    Missing {
        /// Resource path.
        path: String,
        /// Full name of the referencing object.
        owner: String,
    },

    /// The resource exists but could not be read.
    #[error("failed to read resource {path}: {reason}")]
    Read {
        /// Resource path.
        path: String,
        /// Reader message.
        reason: String,
    },
}

/// A persisted record could not be decoded or its schema is unusable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The schema declares no primary key or more than one.
    #[error("record schema {record:?} must declare exactly one primary key")]
    PrimaryKey {
        /// Record name.
        record: String,
    },

    /// Two fields share a name or column.
    #[error("record schema {record:?} declares {field:?} twice")]
    DuplicateField {
        /// Record name.
        record: String,
        /// The duplicated field name or column.
        field: String,
    },

    /// Stored values do not decode into the record type.
    #[error("failed to decode {record} for {key}: {reason}")]
    Decode {
        /// Record name.
        record: String,
        /// Primary key value.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

/// Errors that can occur during pack operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// Manifest rejected.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Data rejected.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A reference could not be bound.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A resource could not be loaded.
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Reading content failed.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// The pack root could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// A persisted property could not be used.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// A fulfillment operation failed.
    #[error(transparent)]
    Fulfill(#[from] FulfillError),

    /// A lifecycle transition was rejected.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Another pack already uses an overlapping namespace.
    #[error("namespace {namespace:?} overlaps registered pack {existing:?}")]
    NamespaceTaken {
        /// Namespace of the rejected pack.
        namespace: String,
        /// Namespace of the registered pack.
        existing: String,
    },

    /// `enable` was called while the pack is not unloaded.
    #[error("pack {namespace:?} cannot be enabled while {state}")]
    AlreadyEnabled {
        /// Pack namespace.
        namespace: String,
        /// Current state.
        state: PackState,
    },

    /// `disable(false)` was called while the pack is loading.
    #[error("pack {namespace:?} is loading; use a forced disable to interrupt it")]
    StillLoading {
        /// Pack namespace.
        namespace: String,
    },

    /// `enable` was called outside a tokio runtime.
    #[error("no tokio runtime available to run the load pipeline")]
    NoRuntime,

    /// No loaded object has this full name.
    #[error("no object named {0:?}")]
    UnknownObject(String),

    /// The object exists but is not an achievement.
    #[error("{0:?} is not an achievement")]
    NotAnAchievement(String),

    /// A broken invariant inside the loader.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl PackError {
    /// Whether this error signals a loader bug rather than bad content.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    /// Whether this error makes a load fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Resource(_))
    }
}

/// Result type alias for pack operations.
pub type PackResult<T> = Result<T, PackError>;
