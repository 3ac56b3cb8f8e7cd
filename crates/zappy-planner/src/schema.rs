//! The JSON shape a planning model's response is required to match, kept
//! deliberately separate from [`zappy_core::action`]'s runtime types so the
//! two can evolve independently (the model-facing shape is a contract with
//! an external LLM; the runtime shape is ours).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use zappy_core::action::{Action, ActionMetadata, ActionPriority, Plan, PlanMetadata};

#[derive(Debug, Deserialize)]
pub(crate) struct ActionNodeSchema {
    pub id: String,
    pub skill: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    #[serde(default)]
    pub input_refs: IndexMap<String, String>,
    #[serde(default)]
    pub output_schema: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub priority: ActionPrioritySchema,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum ActionPrioritySchema {
    #[default]
    Major,
    Minor,
    Skippable,
}

impl From<ActionPrioritySchema> for ActionPriority {
    fn from(schema: ActionPrioritySchema) -> Self {
        match schema {
            ActionPrioritySchema::Major => Self::Major,
            ActionPrioritySchema::Minor => Self::Minor,
            ActionPrioritySchema::Skippable => Self::Skippable,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActionPlanSchema {
    #[serde(default)]
    pub reasoning: String,
    pub actions: Vec<ActionNodeSchema>,
    #[serde(default)]
    pub expected_outcome: String,
}

/// Converts a validated model response into a runtime [`Plan`], attaching
/// provenance metadata. Does not itself run DAG validation — callers invoke
/// [`Plan::validate`] separately so the validation error path is uniform
/// regardless of where the `Plan` came from.
pub(crate) fn into_plan(goal: String, schema: ActionPlanSchema, planner: &str, model: &str, mut captured_context: Value) -> Plan {
    if !schema.expected_outcome.is_empty() {
        if let Value::Object(map) = &mut captured_context {
            map.insert("expected_outcome".to_string(), Value::from(schema.expected_outcome.clone()));
        }
    }
    let actions = schema
        .actions
        .into_iter()
        .map(|node| Action {
            id: node.id,
            skill: node.skill,
            description: node.description,
            inputs: node.inputs,
            reference_map: node.input_refs,
            expected_output: node.output_schema,
            depends_on: node.depends_on,
            priority: node.priority.into(),
            metadata: ActionMetadata::default(),
        })
        .collect();

    Plan {
        goal,
        actions,
        reasoning_trace: schema.reasoning,
        metadata: PlanMetadata {
            planner: planner.to_string(),
            model: model.to_string(),
            captured_context,
        },
    }
}
