//! # apack-core: Foundational Types for Achievement Packs
//!
//! Defines the addressable content hierarchy every other crate builds on.
//! It depends on no other `apack-*` crate.
//!
//! ## Key Design Principles
//!
//! 1. **Arena-owned hierarchy.** Nodes live in a [`Hierarchy`] arena and
//!    point at their parent by generational [`NodeId`]. A disposed node's
//!    handle never resolves again, so stale links are inert.
//!
//! 2. **Full names are addresses.** Dot-joining local ids from the root
//!    down gives a node's full name. Roots carry the pack namespace, which
//!    may itself contain dots.
//!
//! 3. **Bind once.** A [`ResolvableReference`] is created holding only the
//!    id string and is bound exactly once by a [`ResolveContext`].
//!
//! 4. **Explicit observers.** Notifications go through [`Observers`]
//!    registries with explicit subscribe/unsubscribe. Disposal clears them.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `.unwrap()` outside tests.
//! - Locks are `parking_lot`; callbacks never run while a registry lock is
//!   held.

pub mod error;
pub mod hierarchy;
pub mod identity;
pub mod observer;
pub mod reference;
pub mod resolve;
pub mod temporal;

pub use error::{HierarchyError, InternalError, RegistrationError, ResolveError};
pub use hierarchy::{Hierarchy, Node, NodeId};
pub use identity::{LocalId, SEPARATOR};
pub use observer::{Observers, SubscriptionId};
pub use reference::{AssetPath, ReferenceKind, ResolvableReference, ResolvedTarget};
pub use resolve::{HierarchyResolveContext, ResolveContext, ResolveContextCollection};
pub use temporal::Timestamp;
