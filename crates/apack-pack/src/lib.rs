//! # apack-pack: Achievement Content Packs
//!
//! Loads declarative achievement packs into a shared, namespace-addressed
//! hierarchy and wires their conditions into the fulfillment graph.
//!
//! ## Layout of a pack
//!
//! ```text
//! manifest.json          namespace, version, author, names
//! **/*.json|yaml|yml     categories → collections → achievements → objectives
//! resources/             icons referenced by relative path
//! ```
//!
//! ## Flow
//!
//! 1. [`Catalog::register`] reads and validates the manifest.
//! 2. [`Pack::enable`] spawns the [`pipeline`]: discover, validate, attach,
//!    resolve, load resources. Data and reference failures are fatal;
//!    resource failures are reported and the pack still loads.
//! 3. [`Pack::refresh`] evaluates actions through an
//!    [`ActionCheckContext`](apack_fulfill::ActionCheckContext) and
//!    propagates fulfillment.
//! 4. [`Pack::disable`] tears everything down again.
//!
//! ## Crate Policy
//!
//! - Errors are `thiserror` enums carrying the path or full name of the
//!   offending object; see [`error`].
//! - Logging goes through `tracing`; no subscriber is installed here.

pub mod catalog;
pub mod content;
pub mod error;
pub mod manifest;
pub mod model;
pub mod options;
pub mod pack;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod properties;
pub mod report;
pub mod resources;
pub mod text;
pub mod validation;

pub use catalog::{Catalog, CatalogState};
pub use content::{ContentEntry, ContentReader, DirectoryReader, HandlePool, MemoryReader};
pub use error::{
    ContentError, FormatError, ManifestError, PackError, PackResult, PropertyError, ResourceError,
};
pub use manifest::{Manifest, Version, SUPPORTED_FORMAT_VERSION};
pub use model::ContentNode;
pub use options::PackOptions;
pub use pack::{OutlineEntry, Pack, PackEvent};
pub use progress::AchievementStatus;
pub use properties::{
    AchievementProperties, MemoryPropertyStore, PropertyStore, RecordSchema, Storable,
};
pub use report::LoadReport;
pub use resources::ResourceManager;
pub use text::LocalizedText;
