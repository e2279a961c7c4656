//! Achievement progress derived from the condition graph.

use apack_core::{Hierarchy, NodeId};
use apack_fulfill::ConditionGraph;
use serde::Serialize;

use crate::error::{PackError, PackResult};
use crate::model::{AchievementNode, ContentNode};

/// Snapshot of one achievement's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AchievementStatus {
    /// Achievement full name.
    pub full_name: String,
    /// Objectives whose condition currently holds.
    pub completed_objectives: usize,
    /// All objectives.
    pub total_objectives: usize,
    /// Index of the highest tier reached.
    pub tier: Option<usize>,
    /// Points of every reached tier.
    pub points: u32,
    /// Some prerequisite is not completed.
    pub locked: bool,
    /// The last tier is reached.
    pub completed: bool,
    /// Persisted user flag.
    pub tracked: bool,
}

fn achievement<'h>(
    hierarchy: &'h Hierarchy<ContentNode>,
    node: NodeId,
) -> PackResult<&'h AchievementNode> {
    let payload = hierarchy
        .payload(node)
        .ok_or_else(|| PackError::UnknownObject(node.to_string()))?;
    payload.as_achievement().ok_or_else(|| {
        PackError::NotAnAchievement(hierarchy.full_name(node).unwrap_or_else(|| node.to_string()))
    })
}

fn completed_objectives(
    hierarchy: &Hierarchy<ContentNode>,
    graph: &ConditionGraph,
    node: NodeId,
) -> (usize, usize) {
    let Some(children) = hierarchy.get(node).map(|n| n.children()) else {
        return (0, 0);
    };
    let conditions: Vec<_> = children
        .iter()
        .filter_map(|child| hierarchy.payload(*child)?.as_objective())
        .map(|objective| objective.condition)
        .collect();
    let done = conditions
        .iter()
        .filter(|c| graph.is_fulfilled(**c).unwrap_or(false))
        .count();
    (done, conditions.len())
}

/// Whether the achievement at `node` reached its last tier.
pub fn is_completed(hierarchy: &Hierarchy<ContentNode>, graph: &ConditionGraph, node: NodeId) -> bool {
    let Ok(ach) = achievement(hierarchy, node) else {
        return false;
    };
    let (done, _) = completed_objectives(hierarchy, graph, node);
    ach.tiers
        .last()
        .is_some_and(|last| done >= last.count as usize)
}

/// Compute the status of the achievement at `node`.
pub fn achievement_status(
    hierarchy: &Hierarchy<ContentNode>,
    graph: &ConditionGraph,
    node: NodeId,
) -> PackResult<AchievementStatus> {
    let ach = achievement(hierarchy, node)?;
    let (done, total) = completed_objectives(hierarchy, graph, node);

    let reached: Vec<_> = ach
        .tiers
        .iter()
        .take_while(|tier| done >= tier.count as usize)
        .collect();
    // Unbound prerequisites only exist while loading; treat them as unmet.
    let locked = ach.prerequisites.iter().any(|prerequisite| {
        prerequisite
            .resolved_node()
            .map_or(true, |target| !is_completed(hierarchy, graph, target))
    });

    Ok(AchievementStatus {
        full_name: hierarchy.full_name(node).unwrap_or_default(),
        completed_objectives: done,
        total_objectives: total,
        tier: reached.len().checked_sub(1),
        points: reached.iter().map(|tier| tier.points).sum(),
        locked,
        completed: reached.len() == ach.tiers.len() && !ach.tiers.is_empty(),
        tracked: ach.tracked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroupNode, ObjectiveNode, Tier};
    use crate::text::LocalizedText;
    use apack_fulfill::ActionKind;

    fn fixture() -> (Hierarchy<ContentNode>, ConditionGraph, NodeId, Vec<apack_fulfill::ConditionId>) {
        let mut graph = ConditionGraph::new();
        let mut hierarchy = Hierarchy::new();
        let root = hierarchy
            .create_root(
                "core",
                ContentNode::Category(GroupNode {
                    name: LocalizedText::single("en", "Core"),
                }),
            )
            .unwrap();
        let ach = hierarchy
            .create_child(
                root,
                "a",
                ContentNode::Achievement(AchievementNode {
                    name: LocalizedText::single("en", "A"),
                    description: LocalizedText::default(),
                    icon: None,
                    icon_data: None,
                    prerequisites: Vec::new(),
                    tiers: vec![Tier { count: 1, points: 5 }, Tier { count: 2, points: 10 }],
                    tracked: true,
                }),
            )
            .unwrap();
        let mut conditions = Vec::new();
        for id in ["o1", "o2"] {
            let c = graph.add_condition(Some(ActionKind::Manual), None, None).unwrap();
            conditions.push(c);
            hierarchy
                .create_child(
                    ach,
                    id,
                    ContentNode::Objective(ObjectiveNode {
                        name: LocalizedText::single("en", id),
                        description: LocalizedText::default(),
                        condition: c,
                    }),
                )
                .unwrap();
        }
        (hierarchy, graph, ach, conditions)
    }

    #[test]
    fn tiers_follow_completed_objectives() {
        let (hierarchy, mut graph, ach, conditions) = fixture();
        let status = achievement_status(&hierarchy, &graph, ach).unwrap();
        assert_eq!(status.tier, None);
        assert_eq!(status.points, 0);
        assert!(status.tracked);
        assert_eq!(status.full_name, "core.a");

        graph.set_action_fulfilled(conditions[0], true).unwrap();
        let status = achievement_status(&hierarchy, &graph, ach).unwrap();
        assert_eq!((status.completed_objectives, status.total_objectives), (1, 2));
        assert_eq!(status.tier, Some(0));
        assert_eq!(status.points, 5);
        assert!(!status.completed);

        graph.set_action_fulfilled(conditions[1], true).unwrap();
        let status = achievement_status(&hierarchy, &graph, ach).unwrap();
        assert_eq!(status.points, 15);
        assert!(status.completed);
        assert!(is_completed(&hierarchy, &graph, ach));
    }

    #[test]
    fn non_achievements_are_rejected() {
        let (hierarchy, graph, ach, _) = fixture();
        let objective = hierarchy.get(ach).unwrap().children()[0];
        assert!(matches!(
            achievement_status(&hierarchy, &graph, objective),
            Err(PackError::NotAnAchievement(name)) if name == "core.a.o1"
        ));
        assert!(!is_completed(&hierarchy, &graph, objective));
    }
}
