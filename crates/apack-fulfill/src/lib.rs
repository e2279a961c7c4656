//! # apack-fulfill: Fulfillment Propagation
//!
//! Conditions and actions decide whether an objective is met.
//!
//! - [`action`]: the [`ActionKind`] tagged union and the
//!   [`ActionRegistry`] that decodes it from data files.
//! - [`graph`]: the [`ConditionGraph`] arena with incremental AND/OR
//!   propagation and notification freezing.
//! - [`shared`]: [`SharedGraph`], the lock-owning handle that dispatches
//!   changes after releasing its lock.
//! - [`check`]: the [`ActionCheckContext`] consumers fill with predicates.

pub mod action;
pub mod check;
pub mod error;
pub mod graph;
pub mod shared;

pub use action::{ActionKind, ActionRegistry, ComparisonOp, BUILTIN_KINDS};
pub use check::ActionCheckContext;
pub use error::{FulfillError, FulfillResult};
pub use graph::{combine, Action, ConditionGraph, ConditionId, FulfillmentChange};
pub use shared::SharedGraph;
