//! Deterministic text-analysis reference skill (§1), grounded on
//! `agi/skilldock/skills/text_analyzer/scripts/agent.py`'s mock
//! `TextAnalyzerSkill` — a handful of built-in skills exist for end-to-end
//! testability, not as a product surface, so this one skips the real
//! model call the distilled source's LLM-backed variant makes.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};

/// Summarises or extracts key points from text without a model call.
pub struct TextAnalyzerSkill {
    metadata: SkillMetadata,
}

impl TextAnalyzerSkill {
    /// Builds the skill; stateless.
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata: SkillMetadata {
                name: "text_analyzer".to_string(),
                description: "Analyze and summarize text".to_string(),
                category: "logic".to_string(),
                sub_category: "nlp".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "text": {"type": "string", "description": "Text to analyze"},
                        "task": {"type": "string", "description": "summarize | extract_key_points", "default": "summarize"}
                    },
                    "required": ["text"]
                }),
                output_schema: json!({"analysis": "str"}),
                config_schema: None,
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 30_000,
            },
        }
    }
}

impl Default for TextAnalyzerSkill {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Skill for TextAnalyzerSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let text = inputs
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("text_analyzer requires a `text` input".to_string()))?;
        let task = inputs
            .get("task")
            .and_then(Value::as_str)
            .unwrap_or("summarize")
            .to_lowercase();

        let analysis = if task.contains("key") {
            "Key points:\n1. Mock key point one.\n2. Mock key point two.".to_string()
        } else {
            let snippet: String = text.chars().take(50).collect();
            format!("Summary: {snippet}...")
        };

        let mut output = HashMap::new();
        output.insert("analysis".to_string(), Value::String(analysis));
        Ok(output)
    }
}
