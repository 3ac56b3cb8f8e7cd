use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RuntimeError;

/// Declares a runtime setting (API key, toggle) a skill needs before it can
/// run; surfaced verbatim in `config_required` events (§7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillConfigSchema {
    /// Config keys that must be present for the skill to function.
    #[serde(default)]
    pub required_keys: Vec<String>,
    /// JSON-Schema-shaped description of each key, for UI prompting.
    #[serde(default)]
    pub schema: Value,
}

/// Static description of a skill, persisted by the Skill Registry (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMetadata {
    /// Unique key used to reference this skill from an [`crate::action::Action`].
    pub name: String,
    /// Human-readable summary, folded into the planner's system prompt.
    pub description: String,
    /// Broad taxonomic category, used for lexical retrieval boosting.
    pub category: String,
    /// Narrower taxonomic category.
    #[serde(default)]
    pub sub_category: String,
    /// JSON-Schema fragment describing accepted inputs.
    pub input_schema: Value,
    /// Output shape: either a JSON-Schema fragment or a simplified
    /// `{name: type_string}` map.
    pub output_schema: Value,
    /// Declares required runtime settings, if any.
    #[serde(default)]
    pub config_schema: Option<SkillConfigSchema>,
    /// External package names this skill depends on, informational only.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Semver-ish free-form version string.
    #[serde(default = "default_version")]
    pub version: String,
    /// Default per-invocation timeout.
    #[serde(default = "default_timeout_ms")]
    pub timeout_default_ms: u64,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

const fn default_timeout_ms() -> u64 {
    30_000
}

/// A pluggable capability invoked by one [`crate::action::Action`] (§3).
///
/// Implementors may be built-in (compiled with the runtime) or dynamic
/// (backed by a declarative manifest loaded from a directory, §4.2).
#[async_trait::async_trait]
pub trait Skill: Send + Sync {
    /// Static description of this skill.
    fn metadata(&self) -> &SkillMetadata;

    /// Runs the skill against resolved, validated inputs.
    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError>;

    /// Structural validation of `inputs` against [`SkillMetadata::input_schema`]
    /// ahead of [`Skill::execute`]. The default implementation checks only
    /// that declared-required top-level keys are present.
    fn validate_inputs(&self, inputs: &HashMap<String, Value>) -> Result<(), RuntimeError> {
        let Some(required) = self
            .metadata()
            .input_schema
            .get("required")
            .and_then(Value::as_array)
        else {
            return Ok(());
        };
        for key in required {
            let Some(key) = key.as_str() else { continue };
            if !inputs.contains_key(key) {
                return Err(RuntimeError::Validation(format!(
                    "missing required input `{key}` for skill `{}`",
                    self.metadata().name
                )));
            }
        }
        Ok(())
    }

    /// Checks that every key declared in [`SkillMetadata::config_schema`] is
    /// present in this skill's merged runtime config. Called by the
    /// Orchestrator before every invocation (§4.10).
    fn check_config(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Hook invoked immediately before [`Skill::execute`]; default is a
    /// no-op.
    async fn pre_execute(&self, inputs: &HashMap<String, Value>) -> Result<(), RuntimeError> {
        let _ = inputs;
        Ok(())
    }

    /// Hook invoked immediately after a successful [`Skill::execute`];
    /// default is a no-op.
    async fn post_execute(&self, outputs: &HashMap<String, Value>) -> Result<(), RuntimeError> {
        let _ = outputs;
        Ok(())
    }
}
