//! # apack-state: Pack Lifecycle
//!
//! The load/unload state machine of a content pack. Transitions are
//! checked at runtime against the allowed pairs and recorded with a UTC
//! timestamp, mirroring how persisted state machines are handled
//! elsewhere in the workspace.
//!
//! The compile-time side of loading (which step may follow which) lives in
//! the typestate pipeline of `apack-pack`; this crate owns the runtime
//! state the pack exposes to observers.

pub mod lifecycle;

pub use lifecycle::{LifecycleError, LoadStep, PackLifecycle, PackState, TransitionRecord};
