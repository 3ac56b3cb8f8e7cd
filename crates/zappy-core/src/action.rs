use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;

/// Relative urgency of an action's output to the overall plan, driving the
/// Orchestrator's repair escalation policy (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionPriority {
    /// A failure here is worth a full replan if in-place repair fails.
    Major,
    /// A failure here is logged; dependents relying on its output are
    /// implicitly skipped.
    Minor,
    /// A failure here is logged silently and never escalated.
    Skippable,
}

impl Default for ActionPriority {
    fn default() -> Self {
        Self::Major
    }
}

/// Optional per-action overrides that do not affect DAG shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionMetadata {
    /// Overrides the Orchestrator's global execution timeout for this action.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_override_ms: Option<u64>,
}

/// A single unit of work bound to one skill, see §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Identifier, unique within the owning plan.
    pub id: String,
    /// Key into the Skill Registry.
    pub skill: String,
    /// Free-form human-readable description, used by the IO Mapper's
    /// semantic action-inference heuristic (§4.9).
    #[serde(default)]
    pub description: String,
    /// Static input values, keyed by the skill's input parameter name.
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    /// Parameter name to dotted reference (`<action_id>.<output_key>`).
    ///
    /// Named `reference_map`, not `input_schema`, to avoid colliding with
    /// the separate notion of an input *type* schema declared on the skill.
    #[serde(default)]
    pub reference_map: IndexMap<String, String>,
    /// Expected output shape, a JSON-Schema fragment or simplified
    /// `{name: type}` map depending on the skill's own declaration style.
    #[serde(default)]
    pub expected_output: Value,
    /// Other action ids this action must wait on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Escalation class used by the Orchestrator's repair policy.
    #[serde(default)]
    pub priority: ActionPriority,
    /// Optional overrides.
    #[serde(default)]
    pub metadata: ActionMetadata,
}

/// Metadata captured about how a [`Plan`] was produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanMetadata {
    /// Name of the planner implementation that produced this plan.
    #[serde(default)]
    pub planner: String,
    /// Model identifier used for plan synthesis.
    #[serde(default)]
    pub model: String,
    /// Sensor/perception context captured and folded into the prompt.
    #[serde(default)]
    pub captured_context: Value,
}

/// A goal, its ordered DAG of [`Action`]s, and the reasoning trace that
/// produced them (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// The natural-language goal this plan satisfies.
    pub goal: String,
    /// Actions in the order returned by the planner (not necessarily
    /// topological; call [`Plan::topological_generations`] for that).
    pub actions: Vec<Action>,
    /// Free-form trace of the planner's reasoning, if any was captured.
    #[serde(default)]
    pub reasoning_trace: String,
    /// Provenance metadata.
    #[serde(default)]
    pub metadata: PlanMetadata,
}

impl Plan {
    /// Validates the DAG invariants required by §3 and §8: every
    /// `depends_on` id exists, no cycles, no unknown skill among
    /// `known_skills` (when provided).
    pub fn validate(&self, known_skills: Option<&HashSet<String>>) -> Result<(), RuntimeError> {
        let ids: HashSet<&str> = self.actions.iter().map(|a| a.id.as_str()).collect();
        if ids.len() != self.actions.len() {
            return Err(RuntimeError::Validation(
                "plan contains duplicate action ids".to_string(),
            ));
        }
        for action in &self.actions {
            for dep in &action.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(RuntimeError::Validation(format!(
                        "action {} depends on unknown action {dep}",
                        action.id
                    )));
                }
            }
            if let Some(skills) = known_skills {
                if !skills.contains(&action.skill) {
                    return Err(RuntimeError::Validation(format!(
                        "action {} references unknown skill {}",
                        action.id, action.skill
                    )));
                }
            }
        }
        self.topological_generations()?;
        Ok(())
    }

    /// Partitions `actions` into sequential levels of mutually independent
    /// actions (Kahn's algorithm by generation), matching the distilled
    /// source's reliance on `networkx.topological_generations`. Returns a
    /// [`RuntimeError::Validation`] if the dependency graph contains a
    /// cycle.
    pub fn topological_generations(&self) -> Result<Vec<Vec<String>>, RuntimeError> {
        let mut indegree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for action in &self.actions {
            indegree.entry(action.id.as_str()).or_insert(0);
            for dep in &action.depends_on {
                *indegree.entry(action.id.as_str()).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(action.id.as_str());
            }
        }

        // Deterministic ordering: original plan order within a generation.
        let order: HashMap<&str, usize> = self
            .actions
            .iter()
            .enumerate()
            .map(|(i, a)| (a.id.as_str(), i))
            .collect();
        let mut frontier: Vec<&str> = indegree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&id, _)| id)
            .collect();
        frontier.sort_by_key(|id| order[id]);

        let mut generations = Vec::new();
        let mut remaining = indegree.clone();
        let mut seen = 0usize;

        while !frontier.is_empty() {
            generations.push(frontier.iter().map(|s| (*s).to_string()).collect::<Vec<_>>());
            seen += frontier.len();
            let mut next: Vec<&str> = Vec::new();
            for id in &frontier {
                if let Some(children) = dependents.get(id) {
                    for child in children {
                        let entry = remaining.get_mut(child).expect("child indegree tracked");
                        *entry -= 1;
                        if *entry == 0 {
                            next.push(child);
                        }
                    }
                }
            }
            next.sort_by_key(|id| order[id]);
            frontier = next;
        }

        if seen != self.actions.len() {
            return Err(RuntimeError::Validation(
                "action dependency graph contains a cycle".to_string(),
            ));
        }
        Ok(generations)
    }
}
