//! # Actions
//!
//! Leaf predicates of the fulfillment graph. An action is a tagged union
//! keyed by a discriminator string (`"type"` in data files). Built-in kinds
//! are decoded directly; additional kinds are admitted through an
//! [`ActionRegistry`] and decoded as [`ActionKind::Custom`] with their raw
//! parameters.
//!
//! ## Data Format
//!
//! ```json
//! { "type": "position", "map_id": 15, "x": 10.0, "y": 2.5, "z": 0.0, "radius": 5 }
//! { "type": "achievement", "achievement": ".events.daily.first" }
//! { "type": "api", "endpoint": "account", "field": "age", "op": "ge", "value": 3600 }
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use apack_core::{identity, ResolvableReference};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FulfillError, FulfillResult};

/// Discriminators decoded without registration.
pub const BUILTIN_KINDS: [&str; 6] = ["achievement", "map", "position", "character", "api", "manual"];

/// Comparison used by [`ActionKind::ApiValue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    /// `==`
    #[serde(alias = "==")]
    Eq,
    /// `!=`
    #[serde(alias = "!=")]
    Ne,
    /// `<`
    #[serde(alias = "<")]
    Lt,
    /// `<=`
    #[serde(alias = "<=")]
    Le,
    /// `>`
    #[serde(alias = ">")]
    Gt,
    /// `>=`
    #[default]
    #[serde(alias = ">=")]
    Ge,
}

impl ComparisonOp {
    /// Apply the comparison as `actual <op> expected`.
    pub fn evaluate(self, actual: f64, expected: f64) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Ne => actual != expected,
            Self::Lt => actual < expected,
            Self::Le => actual <= expected,
            Self::Gt => actual > expected,
            Self::Ge => actual >= expected,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// What an action tests.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Another achievement has been completed. Resolvable.
    AchievementCompleted {
        /// Reference to the target achievement.
        achievement: Arc<ResolvableReference>,
    },
    /// The player is on a map.
    Map {
        /// Map id.
        map_id: u32,
    },
    /// The player is within `radius` of a point on a map.
    Position {
        /// Map id.
        map_id: u32,
        /// X coordinate.
        x: f64,
        /// Y coordinate.
        y: f64,
        /// Z coordinate.
        z: f64,
        /// Accepted distance.
        radius: f64,
    },
    /// A specific character is active.
    Character {
        /// Character name.
        name: String,
    },
    /// A remote numeric value satisfies a comparison.
    ApiValue {
        /// Endpoint name.
        endpoint: String,
        /// Field within the endpoint payload.
        field: String,
        /// Comparison operator.
        op: ComparisonOp,
        /// Right-hand side.
        value: f64,
    },
    /// Only set explicitly by the user.
    Manual,
    /// A registered kind with its raw parameters.
    Custom {
        /// The registered discriminator.
        kind: String,
        /// Every field except `type`.
        params: Value,
    },
}

impl ActionKind {
    /// The discriminator string of this action.
    pub fn discriminator(&self) -> &str {
        match self {
            Self::AchievementCompleted { .. } => "achievement",
            Self::Map { .. } => "map",
            Self::Position { .. } => "position",
            Self::Character { .. } => "character",
            Self::ApiValue { .. } => "api",
            Self::Manual => "manual",
            Self::Custom { kind, .. } => kind,
        }
    }

    /// The reference this action needs bound before it can be evaluated.
    pub fn reference(&self) -> Option<&Arc<ResolvableReference>> {
        match self {
            Self::AchievementCompleted { achievement } => Some(achievement),
            _ => None,
        }
    }

    /// Whether this action participates in reference resolution.
    pub fn is_resolvable(&self) -> bool {
        self.reference().is_some()
    }

    /// Whether this action is evaluated inside the pack rather than by an
    /// external checker.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::AchievementCompleted { .. } | Self::Manual)
    }
}

fn default_radius() -> f64 {
    1.0
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BuiltinAction {
    Achievement {
        achievement: String,
    },
    Map {
        map_id: u32,
    },
    Position {
        map_id: u32,
        x: f64,
        y: f64,
        z: f64,
        #[serde(default = "default_radius")]
        radius: f64,
    },
    Character {
        name: String,
    },
    Api {
        endpoint: String,
        field: String,
        #[serde(default)]
        op: ComparisonOp,
        value: f64,
    },
    Manual,
}

impl BuiltinAction {
    fn into_kind(self, namespace: &str) -> ActionKind {
        match self {
            Self::Achievement { achievement } => ActionKind::AchievementCompleted {
                achievement: Arc::new(ResolvableReference::node(identity::qualify(
                    namespace,
                    &achievement,
                ))),
            },
            Self::Map { map_id } => ActionKind::Map { map_id },
            Self::Position {
                map_id,
                x,
                y,
                z,
                radius,
            } => ActionKind::Position {
                map_id,
                x,
                y,
                z,
                radius,
            },
            Self::Character { name } => ActionKind::Character { name },
            Self::Api {
                endpoint,
                field,
                op,
                value,
            } => ActionKind::ApiValue {
                endpoint,
                field,
                op,
                value,
            },
            Self::Manual => ActionKind::Manual,
        }
    }
}

/// Discriminator registry: which action kinds data files may use.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    custom: BTreeSet<String>,
}

impl ActionRegistry {
    /// A registry accepting only built-in kinds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit an additional discriminator, decoded as [`ActionKind::Custom`].
    pub fn register(&mut self, kind: impl Into<String>) -> FulfillResult<()> {
        let kind = kind.into();
        if BUILTIN_KINDS.contains(&kind.as_str()) || self.custom.contains(&kind) {
            return Err(FulfillError::KindAlreadyRegistered { kind });
        }
        self.custom.insert(kind);
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_kind(mut self, kind: impl Into<String>) -> FulfillResult<Self> {
        self.register(kind)?;
        Ok(self)
    }

    /// Whether `kind` decodes.
    pub fn is_known(&self, kind: &str) -> bool {
        BUILTIN_KINDS.contains(&kind) || self.custom.contains(kind)
    }

    /// Registered non-builtin discriminators.
    pub fn custom_kinds(&self) -> impl Iterator<Item = &str> {
        self.custom.iter().map(String::as_str)
    }

    /// Decode an action object. Achievement references are qualified
    /// against `namespace`.
    pub fn decode(&self, value: &Value, namespace: &str) -> FulfillResult<ActionKind> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FulfillError::MissingDiscriminator)?;

        if BUILTIN_KINDS.contains(&kind) {
            let builtin =
                BuiltinAction::deserialize(value).map_err(|e| FulfillError::MalformedAction {
                    kind: kind.to_string(),
                    reason: e.to_string(),
                })?;
            return Ok(builtin.into_kind(namespace));
        }

        if self.custom.contains(kind) {
            let mut params = value.clone();
            if let Value::Object(map) = &mut params {
                map.remove("type");
            }
            return Ok(ActionKind::Custom {
                kind: kind.to_string(),
                params,
            });
        }

        Err(FulfillError::UnknownActionKind {
            kind: kind.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_builtin_kinds() {
        let registry = ActionRegistry::new();
        let map = registry.decode(&json!({"type": "map", "map_id": 15}), "core").unwrap();
        assert!(matches!(map, ActionKind::Map { map_id: 15 }));

        let pos = registry
            .decode(
                &json!({"type": "position", "map_id": 1, "x": 1.0, "y": 2.0, "z": 3.0}),
                "core",
            )
            .unwrap();
        match pos {
            ActionKind::Position { radius, .. } => assert_eq!(radius, 1.0),
            other => panic!("unexpected {other:?}"),
        }

        let api = registry
            .decode(
                &json!({"type": "api", "endpoint": "account", "field": "age", "op": ">", "value": 10}),
                "core",
            )
            .unwrap();
        assert!(matches!(api, ActionKind::ApiValue { op: ComparisonOp::Gt, .. }));
        assert!(matches!(
            registry.decode(&json!({"type": "manual"}), "core").unwrap(),
            ActionKind::Manual
        ));
    }

    #[test]
    fn achievement_reference_is_qualified() {
        let registry = ActionRegistry::new();
        let action = registry
            .decode(&json!({"type": "achievement", "achievement": ".cat.coll.first"}), "core")
            .unwrap();
        let reference = action.reference().unwrap();
        assert_eq!(reference.reference_id(), "core.cat.coll.first");
        assert!(!reference.is_resolved());
        assert!(action.is_resolvable());
        assert!(action.is_internal());
    }

    #[test]
    fn custom_kinds_need_registration() {
        let value = json!({"type": "festival", "name": "wintersday"});
        let err = ActionRegistry::new().decode(&value, "core").unwrap_err();
        assert_eq!(
            err,
            FulfillError::UnknownActionKind {
                kind: "festival".into()
            }
        );

        let registry = ActionRegistry::new().with_kind("festival").unwrap();
        match registry.decode(&value, "core").unwrap() {
            ActionKind::Custom { kind, params } => {
                assert_eq!(kind, "festival");
                assert_eq!(params, json!({"name": "wintersday"}));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn builtin_kinds_cannot_be_registered() {
        let mut registry = ActionRegistry::new();
        assert!(registry.register("map").is_err());
        registry.register("festival").unwrap();
        assert!(registry.register("festival").is_err());
        assert!(registry.is_known("festival"));
    }

    #[test]
    fn missing_type_and_bad_fields() {
        let registry = ActionRegistry::new();
        assert_eq!(
            registry.decode(&json!({"map_id": 1}), "core").unwrap_err(),
            FulfillError::MissingDiscriminator
        );
        assert!(matches!(
            registry.decode(&json!({"type": "map"}), "core"),
            Err(FulfillError::MalformedAction { .. })
        ));
    }

    #[test]
    fn comparison_ops() {
        assert!(ComparisonOp::Ge.evaluate(3.0, 3.0));
        assert!(!ComparisonOp::Gt.evaluate(3.0, 3.0));
        assert!(ComparisonOp::Ne.evaluate(1.0, 2.0));
        assert_eq!(ComparisonOp::Le.to_string(), "<=");
    }
}
