//! Bridges plan-composable skill invocation back into the facade itself
//! (§4.12 step 6), grounded on
//! `agi/skilldock/skills/agi_interface/scripts/agent.py`'s fire-and-forget
//! `AGIInterfaceSkill`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};

use crate::facade::Agi;

/// Lets a plan step delegate a sub-goal back to the full `Agi::execute`
/// pipeline, fire-and-forget: it spawns the nested call and returns
/// immediately rather than blocking the orchestrator on a recursive
/// planning/execution round, matching the distilled source's
/// `asyncio.create_task` without an `await`.
pub struct AgiBrainInterfaceSkill {
    metadata: SkillMetadata,
    agi: Arc<OnceCell<Agi>>,
}

impl AgiBrainInterfaceSkill {
    /// Takes an empty cell; [`crate::facade::AgiBuilder::build`] fills it in
    /// once the [`Agi`] this skill calls back into has been fully assembled.
    #[must_use]
    pub fn new(agi: Arc<OnceCell<Agi>>) -> Self {
        Self {
            metadata: SkillMetadata {
                name: "agi_brain_interface".to_string(),
                description: "Delegate a sub-goal back to the full reasoning pipeline".to_string(),
                category: "meta".to_string(),
                sub_category: String::new(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "goal": {"type": "string"},
                        "speak": {"type": "boolean", "default": false}
                    },
                    "required": ["goal"]
                }),
                output_schema: json!({"status": "str", "goal": "str"}),
                config_schema: None,
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 5_000,
            },
            agi,
        }
    }
}

#[async_trait]
impl Skill for AgiBrainInterfaceSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let goal = inputs
            .get("goal")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("agi_brain_interface requires a `goal` input".to_string()))?
            .to_string();
        let speak = inputs.get("speak").and_then(Value::as_bool).unwrap_or(false);

        let Some(agi) = self.agi.get().cloned() else {
            return Err(RuntimeError::Fatal(
                "agi_brain_interface invoked before the facade finished initializing".to_string(),
            ));
        };

        let spawned_goal = goal.clone();
        tokio::spawn(async move {
            if let Err(err) = agi.execute(&spawned_goal, None, speak).await {
                agi.log_background_failure(&spawned_goal, &err);
            }
        });

        let mut output = HashMap::new();
        output.insert("status".to_string(), Value::String("submitted".to_string()));
        output.insert("goal".to_string(), Value::String(goal));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_goal_input_is_a_validation_error() {
        let skill = AgiBrainInterfaceSkill::new(Arc::new(OnceCell::new()));
        let result = skill.execute(HashMap::new()).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }

    #[tokio::test]
    async fn invoking_before_the_facade_is_assembled_is_fatal() {
        let skill = AgiBrainInterfaceSkill::new(Arc::new(OnceCell::new()));
        let mut inputs = HashMap::new();
        inputs.insert("goal".to_string(), Value::String("do something".to_string()));
        let result = skill.execute(inputs).await;
        assert!(matches!(result, Err(RuntimeError::Fatal(_))));
    }
}
