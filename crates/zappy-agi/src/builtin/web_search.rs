//! Config-gated web-search reference skill (§8 scenario 5), grounded on
//! `agi/skilldock/skills/web_search/scripts/agent.py`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillConfigSchema, SkillMetadata};
use zappy_skill_registry::store::SkillStore;

/// Searches the web for information. The reference implementation returns
/// deterministic mock results rather than calling a real search engine —
/// individual search-provider integrations are out of scope — but still
/// enforces the same `config_schema` gate the real skill would, holding its
/// own [`SkillStore`] clone since [`Skill::check_config`] takes no
/// parameters through which the registry could otherwise be reached.
pub struct WebSearchSkill {
    metadata: SkillMetadata,
    store: SkillStore,
}

impl WebSearchSkill {
    /// Wires the skills database this skill reads its own config from.
    #[must_use]
    pub fn new(store: SkillStore) -> Self {
        let required_keys = vec!["GOOGLE_SEARCH_API_KEY".to_string(), "GOOGLE_SEARCH_ID".to_string()];
        Self {
            metadata: SkillMetadata {
                name: "web_search".to_string(),
                description: "Search the web for information".to_string(),
                category: "web".to_string(),
                sub_category: "search".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The search query"},
                        "num_results": {"type": "integer", "default": 5}
                    },
                    "required": ["query"]
                }),
                output_schema: json!({
                    "type": "object",
                    "properties": {
                        "results": {"type": "array"},
                        "engine_used": {"type": "string"},
                        "query_used": {"type": "string"}
                    }
                }),
                config_schema: Some(SkillConfigSchema {
                    required_keys,
                    schema: json!({
                        "type": "object",
                        "properties": {
                            "GOOGLE_SEARCH_API_KEY": {"type": "string", "description": "Google Custom Search API key"},
                            "GOOGLE_SEARCH_ID": {"type": "string", "description": "Google Search Engine ID (CX)"}
                        },
                        "required": ["GOOGLE_SEARCH_API_KEY", "GOOGLE_SEARCH_ID"]
                    }),
                }),
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 30_000,
            },
            store,
        }
    }
}

#[async_trait]
impl Skill for WebSearchSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    fn check_config(&self) -> Result<(), RuntimeError> {
        let Some(schema) = &self.metadata.config_schema else {
            return Ok(());
        };
        let config = self
            .store
            .get_config(&self.metadata.name)
            .map_err(|err| RuntimeError::Fatal(format!("failed to read web_search config: {err}")))?;
        let missing: Vec<String> = schema
            .required_keys
            .iter()
            .filter(|key| {
                config
                    .get(key.as_str())
                    .and_then(Value::as_str)
                    .map_or(true, str::is_empty)
            })
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(RuntimeError::Configuration {
                component: self.metadata.name.clone(),
                missing_keys: missing,
                schema: schema.schema.clone(),
            })
        }
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let query = inputs
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("web_search requires a `query` input".to_string()))?;

        let mut output = HashMap::new();
        output.insert(
            "results".to_string(),
            json!([{
                "title": format!("Result for {query}"),
                "url": "https://example.invalid/search",
                "snippet": format!("Mock search result summarising '{query}'.")
            }]),
        );
        output.insert("engine_used".to_string(), Value::String("mock".to_string()));
        output.insert("query_used".to_string(), Value::String(query.to_string()));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::{migrate_skills_db, Database};

    fn store() -> SkillStore {
        SkillStore::new(Database::open_in_memory(migrate_skills_db).unwrap())
    }

    #[test]
    fn check_config_fails_when_required_keys_are_absent() {
        let skill = WebSearchSkill::new(store());
        let err = skill.check_config().unwrap_err();
        assert!(matches!(err, RuntimeError::Configuration { .. }));
    }

    #[test]
    fn check_config_passes_once_both_keys_are_set() {
        let store = store();
        store
            .update_config(
                "web_search",
                &json!({"GOOGLE_SEARCH_API_KEY": "key", "GOOGLE_SEARCH_ID": "cx"}),
            )
            .unwrap();
        let skill = WebSearchSkill::new(store);
        assert!(skill.check_config().is_ok());
    }

    #[tokio::test]
    async fn execute_returns_mock_results() {
        let skill = WebSearchSkill::new(store());
        let mut inputs = HashMap::new();
        inputs.insert("query".to_string(), Value::String("rust async traits".to_string()));
        let output = skill.execute(inputs).await.unwrap();
        assert_eq!(output.get("engine_used").and_then(Value::as_str), Some("mock"));
    }
}
