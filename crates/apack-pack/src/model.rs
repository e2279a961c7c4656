//! Pack data model.
//!
//! Two layers:
//!
//! - **Definitions** (`*Def`): what a data file says, decoded with serde.
//!   Ids are plain strings here; validation checks them.
//! - **Content nodes** ([`ContentNode`]): payloads stored in the shared
//!   hierarchy once a pack is attached. Conditions live in the condition
//!   graph and are referenced by [`ConditionId`].

use std::sync::Arc;

use apack_core::ResolvableReference;
use apack_fulfill::ConditionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::text::LocalizedText;

// ─── Definitions ─────────────────────────────────────────────────────

/// Top level of a data file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataFile {
    /// Categories defined by this file.
    #[serde(default)]
    pub categories: Vec<CategoryDef>,
}

/// A category.
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryDef {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Collections in display order.
    #[serde(default)]
    pub collections: Vec<CollectionDef>,
}

/// A collection of achievements.
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionDef {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Achievements in display order.
    #[serde(default)]
    pub achievements: Vec<AchievementDef>,
}

/// An achievement.
#[derive(Debug, Clone, Deserialize)]
pub struct AchievementDef {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    #[serde(default)]
    pub description: LocalizedText,
    /// Icon path relative to the resource area.
    #[serde(default)]
    pub icon: Option<String>,
    /// Achievements that must be completed first (`.`-relative allowed).
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Reward tiers, ascending by objective count.
    #[serde(default)]
    pub tiers: Vec<Tier>,
    /// Objectives in display order.
    #[serde(default)]
    pub objectives: Vec<ObjectiveDef>,
}

/// A reward tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Completed objectives needed to reach this tier.
    pub count: u32,
    /// Points awarded by this tier.
    #[serde(default)]
    pub points: u32,
}

/// An objective.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectiveDef {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    #[serde(default)]
    pub description: LocalizedText,
    /// What fulfills this objective.
    pub condition: ConditionDef,
}

/// A condition as written: the action stays raw until validation decodes
/// it through the discriminator registry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionDef {
    /// Raw action object with a `type` discriminator.
    #[serde(default)]
    pub action: Option<Value>,
    /// Must hold together with the action.
    #[serde(default, rename = "and")]
    pub and_condition: Option<Box<ConditionDef>>,
    /// Alternative to the local term.
    #[serde(default, rename = "or")]
    pub or_condition: Option<Box<ConditionDef>>,
}

// ─── Content Nodes ───────────────────────────────────────────────────

/// Hierarchy payload of a loaded object.
#[derive(Debug, Clone)]
pub enum ContentNode {
    /// A pack root, named by its namespace.
    Pack(PackNode),
    /// A category.
    Category(GroupNode),
    /// A collection.
    Collection(GroupNode),
    /// An achievement.
    Achievement(AchievementNode),
    /// An objective.
    Objective(ObjectiveNode),
}

impl ContentNode {
    /// Display name of the object.
    pub fn name(&self) -> &LocalizedText {
        match self {
            Self::Pack(n) => &n.name,
            Self::Category(n) | Self::Collection(n) => &n.name,
            Self::Achievement(n) => &n.name,
            Self::Objective(n) => &n.name,
        }
    }

    /// Short kind label for listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pack(_) => "pack",
            Self::Category(_) => "category",
            Self::Collection(_) => "collection",
            Self::Achievement(_) => "achievement",
            Self::Objective(_) => "objective",
        }
    }

    /// The achievement payload, if this is one.
    pub fn as_achievement(&self) -> Option<&AchievementNode> {
        match self {
            Self::Achievement(a) => Some(a),
            _ => None,
        }
    }

    /// Mutable achievement payload.
    pub fn as_achievement_mut(&mut self) -> Option<&mut AchievementNode> {
        match self {
            Self::Achievement(a) => Some(a),
            _ => None,
        }
    }

    /// The objective payload, if this is one.
    pub fn as_objective(&self) -> Option<&ObjectiveNode> {
        match self {
            Self::Objective(o) => Some(o),
            _ => None,
        }
    }

    /// References held directly by this node.
    pub fn references(&self) -> Vec<Arc<ResolvableReference>> {
        match self {
            Self::Achievement(a) => a
                .prerequisites
                .iter()
                .chain(a.icon.iter())
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Payload of a pack root.
#[derive(Debug, Clone)]
pub struct PackNode {
    /// Display name from the manifest.
    pub name: LocalizedText,
}

/// Payload of a category or collection.
#[derive(Debug, Clone)]
pub struct GroupNode {
    /// Display name.
    pub name: LocalizedText,
}

/// Payload of an achievement.
#[derive(Debug, Clone)]
pub struct AchievementNode {
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    pub description: LocalizedText,
    /// Icon reference, bound while loading resources.
    pub icon: Option<Arc<ResolvableReference>>,
    /// Icon bytes once loaded.
    pub icon_data: Option<Arc<[u8]>>,
    /// Prerequisite achievements.
    pub prerequisites: Vec<Arc<ResolvableReference>>,
    /// Reward tiers.
    pub tiers: Vec<Tier>,
    /// Persisted user flag.
    pub tracked: bool,
}

/// Payload of an objective.
#[derive(Debug, Clone)]
pub struct ObjectiveNode {
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    pub description: LocalizedText,
    /// Root of the objective's condition tree.
    pub condition: ConditionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_uses_and_or_keys() {
        let def: ConditionDef = serde_json::from_value(serde_json::json!({
            "action": {"type": "map", "map_id": 1},
            "and": {"action": {"type": "manual"}},
            "or": {"action": {"type": "character", "name": "Rytlock"}}
        }))
        .unwrap();
        assert!(def.action.is_some());
        assert!(def.and_condition.unwrap().action.is_some());
        assert!(def.or_condition.is_some());
    }

    #[test]
    fn unknown_condition_keys_are_rejected() {
        let res: Result<ConditionDef, _> =
            serde_json::from_value(serde_json::json!({"not": {"action": {"type": "manual"}}}));
        assert!(res.is_err());
    }

    #[test]
    fn achievement_defaults() {
        let def: AchievementDef = serde_json::from_value(serde_json::json!({
            "id": "first",
            "name": "First Steps",
        }))
        .unwrap();
        assert!(def.icon.is_none());
        assert!(def.objectives.is_empty());
        assert!(def.description.is_blank());
    }
}
