//! # Data Validation
//!
//! Turns parsed data files into validated units ready to attach. Every rule
//! is checked for every object and all violations are collected, so one
//! load reports every problem in the pack instead of only the first.
//!
//! ## Rules
//!
//! 1. Ids are valid single segments; display names are not blank.
//! 2. Full names are unique across all data files of a pack.
//! 3. Achievements have at least one objective and at least one tier;
//!    tier counts start at 1, strictly ascend, and never exceed the number
//!    of objectives.
//! 4. Every condition node carries an action or a sub-condition, and every
//!    action decodes through the discriminator registry.
//! 5. Prerequisites qualify to syntactically valid full names.

use std::collections::BTreeSet;

use apack_core::identity;
use apack_fulfill::{ActionKind, ActionRegistry};

use crate::error::FormatError;
use crate::model::{AchievementDef, ConditionDef, DataFile, ObjectiveDef, Tier};
use crate::text::LocalizedText;

// ---------------------------------------------------------------------------
// Validated Units
// ---------------------------------------------------------------------------

/// A condition tree with decoded actions.
#[derive(Debug, Clone)]
pub struct ConditionTree {
    /// Decoded action, if any.
    pub action: Option<ActionKind>,
    /// Conjunctive branch.
    pub and: Option<Box<ConditionTree>>,
    /// Disjunctive branch.
    pub or: Option<Box<ConditionTree>>,
}

/// A validated objective.
#[derive(Debug, Clone)]
pub struct ValidatedObjective {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    pub description: LocalizedText,
    /// Condition tree.
    pub condition: ConditionTree,
}

/// A validated achievement.
#[derive(Debug, Clone)]
pub struct ValidatedAchievement {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Display description.
    pub description: LocalizedText,
    /// Icon path inside the resource area.
    pub icon: Option<String>,
    /// Fully qualified prerequisite names.
    pub prerequisites: Vec<String>,
    /// Reward tiers.
    pub tiers: Vec<Tier>,
    /// Objectives in order.
    pub objectives: Vec<ValidatedObjective>,
}

/// A validated collection.
#[derive(Debug, Clone)]
pub struct ValidatedCollection {
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Achievements in order.
    pub achievements: Vec<ValidatedAchievement>,
}

/// A validated category with the file it came from.
#[derive(Debug, Clone)]
pub struct ValidatedCategory {
    /// Data file path.
    pub source: String,
    /// Local id.
    pub id: String,
    /// Display name.
    pub name: LocalizedText,
    /// Collections in order.
    pub collections: Vec<ValidatedCollection>,
}

impl ValidatedCategory {
    /// Number of achievements in this category.
    pub fn achievement_count(&self) -> usize {
        self.collections.iter().map(|c| c.achievements.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Validates the data files of one pack.
#[derive(Debug)]
pub struct Validator<'a> {
    namespace: &'a str,
    registry: &'a ActionRegistry,
    seen: BTreeSet<String>,
    errors: Vec<FormatError>,
}

impl<'a> Validator<'a> {
    /// A validator for objects under `namespace`.
    pub fn new(namespace: &'a str, registry: &'a ActionRegistry) -> Self {
        Self {
            namespace,
            registry,
            seen: BTreeSet::new(),
            errors: Vec::new(),
        }
    }

    /// Validate one parsed file. Errors accumulate in the validator.
    pub fn validate_file(&mut self, path: &str, file: &DataFile) -> Vec<ValidatedCategory> {
        let mut out = Vec::new();
        for category in &file.categories {
            let full = identity::join(self.namespace, &category.id);
            let ok = self.check_object(path, &full, &category.id, &category.name);
            let collections = category
                .collections
                .iter()
                .filter_map(|collection| {
                    let coll_full = identity::join(&full, &collection.id);
                    let ok = self.check_object(path, &coll_full, &collection.id, &collection.name);
                    let achievements: Vec<_> = collection
                        .achievements
                        .iter()
                        .filter_map(|a| self.achievement(path, &coll_full, a))
                        .collect();
                    ok.then(|| ValidatedCollection {
                        id: collection.id.clone(),
                        name: collection.name.clone(),
                        achievements,
                    })
                })
                .collect();
            if ok {
                out.push(ValidatedCategory {
                    source: path.to_string(),
                    id: category.id.clone(),
                    name: category.name.clone(),
                    collections,
                });
            }
        }
        out
    }

    /// Finish validation, returning every collected error.
    pub fn finish(self) -> Result<(), Vec<FormatError>> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }

    /// Errors collected so far.
    pub fn errors(&self) -> &[FormatError] {
        &self.errors
    }

    fn invalid(&mut self, path: &str, object: &str, reason: impl Into<String>) {
        self.errors.push(FormatError::Invalid {
            path: path.to_string(),
            object: object.to_string(),
            reason: reason.into(),
        });
    }

    /// Id, name and uniqueness checks shared by every object.
    fn check_object(&mut self, path: &str, full: &str, id: &str, name: &LocalizedText) -> bool {
        let mut ok = true;
        if let Err(e) = identity::validate_segment(id) {
            self.invalid(path, full, e.to_string());
            ok = false;
        }
        if name.is_blank() {
            self.invalid(path, full, "name must not be empty");
            ok = false;
        }
        if !self.seen.insert(full.to_string()) {
            self.errors.push(FormatError::Duplicate {
                path: path.to_string(),
                object: full.to_string(),
            });
            ok = false;
        }
        ok
    }

    fn achievement(
        &mut self,
        path: &str,
        parent: &str,
        def: &AchievementDef,
    ) -> Option<ValidatedAchievement> {
        let full = identity::join(parent, &def.id);
        let mut ok = self.check_object(path, &full, &def.id, &def.name);

        if def.objectives.is_empty() {
            self.invalid(path, &full, "achievement has no objectives");
            ok = false;
        }
        if let Err(reason) = check_tiers(&def.tiers, def.objectives.len()) {
            self.invalid(path, &full, reason);
            ok = false;
        }
        if def.icon.as_deref().is_some_and(|icon| icon.trim().is_empty()) {
            self.invalid(path, &full, "icon path must not be empty");
            ok = false;
        }

        let mut prerequisites = Vec::with_capacity(def.prerequisites.len());
        for written in &def.prerequisites {
            let qualified = identity::qualify(self.namespace, written);
            match identity::validate_namespace(&qualified) {
                Ok(()) => prerequisites.push(qualified),
                Err(e) => {
                    self.invalid(path, &full, format!("prerequisite {written:?}: {e}"));
                    ok = false;
                }
            }
        }

        let objectives: Vec<_> = def
            .objectives
            .iter()
            .filter_map(|o| self.objective(path, &full, o))
            .collect();
        if objectives.len() != def.objectives.len() {
            ok = false;
        }

        ok.then(|| ValidatedAchievement {
            id: def.id.clone(),
            name: def.name.clone(),
            description: def.description.clone(),
            icon: def.icon.clone(),
            prerequisites,
            tiers: def.tiers.clone(),
            objectives,
        })
    }

    fn objective(&mut self, path: &str, parent: &str, def: &ObjectiveDef) -> Option<ValidatedObjective> {
        let full = identity::join(parent, &def.id);
        let ok = self.check_object(path, &full, &def.id, &def.name);
        let condition = self.condition(path, &full, &def.condition);
        match (ok, condition) {
            (true, Some(condition)) => Some(ValidatedObjective {
                id: def.id.clone(),
                name: def.name.clone(),
                description: def.description.clone(),
                condition,
            }),
            _ => None,
        }
    }

    fn condition(&mut self, path: &str, owner: &str, def: &ConditionDef) -> Option<ConditionTree> {
        if def.action.is_none() && def.and_condition.is_none() && def.or_condition.is_none() {
            self.invalid(path, owner, "condition has neither an action nor a sub-condition");
            return None;
        }
        let action = match &def.action {
            Some(raw) => match self.registry.decode(raw, self.namespace) {
                Ok(kind) => Some(Some(kind)),
                Err(source) => {
                    self.errors.push(FormatError::Action {
                        path: path.to_string(),
                        object: owner.to_string(),
                        source,
                    });
                    None
                }
            },
            None => Some(None),
        };
        let and = def
            .and_condition
            .as_deref()
            .map(|c| self.condition(path, owner, c));
        let or = def
            .or_condition
            .as_deref()
            .map(|c| self.condition(path, owner, c));

        let action = action?;
        let and = match and {
            Some(tree) => Some(Box::new(tree?)),
            None => None,
        };
        let or = match or {
            Some(tree) => Some(Box::new(tree?)),
            None => None,
        };
        Some(ConditionTree { action, and, or })
    }
}

fn check_tiers(tiers: &[Tier], objectives: usize) -> Result<(), String> {
    let Some(last) = tiers.last() else {
        return Err("achievement has no tiers".into());
    };
    if tiers[0].count == 0 {
        return Err("tier count must be at least 1".into());
    }
    if let Some(pair) = tiers.windows(2).find(|w| w[1].count <= w[0].count) {
        return Err(format!(
            "tier counts must ascend ({} is followed by {})",
            pair[0].count, pair[1].count
        ));
    }
    if last.count as usize > objectives {
        return Err(format!(
            "last tier needs {} objectives but only {objectives} exist",
            last.count
        ));
    }
    Ok(())
}

/// Validate every file of a pack, collecting all errors.
pub fn validate_files(
    namespace: &str,
    registry: &ActionRegistry,
    files: &[(String, DataFile)],
) -> Result<Vec<ValidatedCategory>, Vec<FormatError>> {
    let mut validator = Validator::new(namespace, registry);
    let categories: Vec<_> = files
        .iter()
        .flat_map(|(path, file)| validator.validate_file(path, file))
        .collect();
    validator.finish().map(|()| categories)
}
