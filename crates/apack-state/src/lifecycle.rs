//! # Pack Lifecycle State Machine
//!
//! Runtime-checked lifecycle of a content pack.
//!
//! ## States
//!
//! - `Unloaded` → initial and final state; nothing attached.
//! - `Loading` → the load pipeline task is running.
//! - `Loaded` → content attached, resolved and queryable.
//! - `FatalError` → the pipeline aborted on bad data or references.
//! - `Unloading` → teardown in progress.
//!
//! ## Allowed Transitions
//!
//! ```text
//! Unloaded ──enable()──▶ Loading ──ok──▶ Loaded ────────┐
//!    ▲                     │  │                         │
//!    │                     │  └──fatal──▶ FatalError ───┤ disable()
//!    │                     │                            ▼
//!    └──────────────── Unloading ◀── cancel / disable(force)
//! ```
//!
//! `Loading → Unloading` is only taken on cancellation or a forced
//! disable; the pipeline itself never takes it on success or failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use apack_core::Timestamp;

// ─── States ──────────────────────────────────────────────────────────

/// Lifecycle state of a pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackState {
    /// Nothing attached.
    #[default]
    Unloaded,
    /// The load pipeline is running.
    Loading,
    /// Content is attached and queryable.
    Loaded,
    /// The pipeline aborted.
    FatalError,
    /// Teardown in progress.
    Unloading,
}

impl PackState {
    /// Returns the canonical state name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unloaded => "UNLOADED",
            Self::Loading => "LOADING",
            Self::Loaded => "LOADED",
            Self::FatalError => "FATAL_ERROR",
            Self::Unloading => "UNLOADING",
        }
    }

    /// Whether the pack is settled (no task running, no teardown pending).
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Unloaded | Self::Loaded | Self::FatalError)
    }

    /// Whether content of this pack may still be attached.
    pub fn holds_content(&self) -> bool {
        matches!(self, Self::Loaded | Self::FatalError)
    }

    /// Whether `self → to` is allowed.
    pub fn can_transition_to(&self, to: PackState) -> bool {
        matches!(
            (*self, to),
            (PackState::Unloaded, PackState::Loading)
                | (PackState::Loading, PackState::Loaded)
                | (PackState::Loading, PackState::FatalError)
                | (PackState::Loading, PackState::Unloading)
                | (PackState::Loaded, PackState::Unloading)
                | (PackState::FatalError, PackState::Unloading)
                | (PackState::Unloading, PackState::Unloaded)
        )
    }
}

impl std::fmt::Display for PackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Transition Record ───────────────────────────────────────────────

/// Record of a single lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition.
    pub from_state: PackState,
    /// State after the transition.
    pub to_state: PackState,
    /// When the transition occurred (UTC).
    pub timestamp: Timestamp,
    /// Why the transition happened.
    pub reason: Option<String>,
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors raised by lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Attempted transition is not allowed by the state machine.
    #[error("invalid pack transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: PackState,
        /// Attempted target state.
        to: PackState,
    },
}

// ─── The Lifecycle ───────────────────────────────────────────────────

/// Current state plus the log of every transition taken.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackLifecycle {
    state: PackState,
    transition_log: Vec<TransitionRecord>,
}

impl PackLifecycle {
    /// A lifecycle in `Unloaded` with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current state.
    pub fn state(&self) -> PackState {
        self.state
    }

    /// Every transition taken so far, oldest first.
    pub fn transition_log(&self) -> &[TransitionRecord] {
        &self.transition_log
    }

    /// Number of transitions taken.
    pub fn transition_count(&self) -> usize {
        self.transition_log.len()
    }

    /// Attempt a transition with runtime validation.
    ///
    /// Records the transition on success. Returns the previous state.
    pub fn try_transition(
        &mut self,
        to: PackState,
        reason: Option<String>,
    ) -> Result<PackState, LifecycleError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(LifecycleError::InvalidTransition { from, to });
        }
        tracing::trace!(from = %from, to = %to, "pack transition");
        self.transition_log.push(TransitionRecord {
            from_state: from,
            to_state: to,
            timestamp: Timestamp::now(),
            reason,
        });
        self.state = to;
        Ok(from)
    }
}

// ─── Load Steps ──────────────────────────────────────────────────────

/// The ordered steps of the load pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStep {
    /// Enumerate and parse data files.
    Discover,
    /// Validate every parsed unit.
    Validate,
    /// Attach units under the pack root and register it.
    Attach,
    /// Bind every reference.
    Resolve,
    /// Load resources referenced by achievements.
    LoadResources,
}

impl LoadStep {
    /// All steps in execution order.
    pub const ALL: [LoadStep; 5] = [
        LoadStep::Discover,
        LoadStep::Validate,
        LoadStep::Attach,
        LoadStep::Resolve,
        LoadStep::LoadResources,
    ];

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Discover => "discover",
            Self::Validate => "validate",
            Self::Attach => "attach",
            Self::Resolve => "resolve",
            Self::LoadResources => "load_resources",
        }
    }
}

impl std::fmt::Display for LoadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
