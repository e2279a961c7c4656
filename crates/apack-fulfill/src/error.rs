//! # Fulfillment Errors

use thiserror::Error;

use crate::graph::ConditionId;

/// Errors raised while decoding actions, building conditions or
/// registering checkers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FulfillError {
    /// An action object has no `type` discriminator.
    #[error("action is missing its \"type\" discriminator")]
    MissingDiscriminator,

    /// The discriminator is neither built in nor registered.
    #[error("unknown action kind {kind:?}")]
    UnknownActionKind {
        /// The unrecognized discriminator.
        kind: String,
    },

    /// The action fields do not match its kind.
    #[error("malformed {kind:?} action: {reason}")]
    MalformedAction {
        /// The discriminator.
        kind: String,
        /// Decoder message.
        reason: String,
    },

    /// A custom kind would shadow a built-in or earlier registration.
    #[error("action kind {kind:?} is already registered")]
    KindAlreadyRegistered {
        /// The duplicated discriminator.
        kind: String,
    },

    /// A checker for this kind already exists.
    #[error("a checker for action kind {kind:?} already exists")]
    CheckerExists {
        /// The duplicated discriminator.
        kind: String,
    },

    /// A condition without sub-conditions must carry an action.
    #[error("condition has neither an action nor sub-conditions")]
    EmptyCondition,

    /// A condition handle does not exist (disposed or never created).
    #[error("condition {0} does not exist")]
    UnknownCondition(ConditionId),

    /// A sub-condition is already owned by another condition.
    #[error("condition {0} already has a parent")]
    AlreadyOwned(ConditionId),

    /// Only whole condition trees can be removed.
    #[error("condition {0} is not the root of its tree")]
    NotATreeRoot(ConditionId),

    /// The condition has no action to update.
    #[error("condition {0} has no action")]
    NoAction(ConditionId),
}

/// Result alias for fulfillment operations.
pub type FulfillResult<T> = Result<T, FulfillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_display_names_kind() {
        let err = FulfillError::UnknownActionKind {
            kind: "teleport".into(),
        };
        assert!(err.to_string().contains("\"teleport\""));
    }

    #[test]
    fn malformed_display_includes_reason() {
        let err = FulfillError::MalformedAction {
            kind: "map".into(),
            reason: "missing field `map_id`".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("map"));
        assert!(msg.contains("map_id"));
    }
}
