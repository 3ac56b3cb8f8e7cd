//! Spoken-output reference skill (§4.7), grounded on
//! `agi/skilldock/skills/speak/scripts/agent.py`. The skill itself toggles
//! the shared [`AudioGate`] around playback — not the facade — so the
//! Voice Ear sensor stays blind to the runtime's own speech regardless of
//! which caller triggered `speak`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};
use zappy_sensors::AudioGate;

/// Synthesises and "plays" spoken output. The reference implementation has
/// no real text-to-speech backend wired in — individual voice-synthesis
/// integrations are out of scope — but still exercises the gate protocol a
/// real backend would.
pub struct SpeakSkill {
    metadata: SkillMetadata,
    gate: Arc<AudioGate>,
}

impl SpeakSkill {
    /// Wires the shared speaking gate.
    #[must_use]
    pub fn new(gate: Arc<AudioGate>) -> Self {
        Self {
            metadata: SkillMetadata {
                name: "speak".to_string(),
                description: "Speak text out loud via text-to-speech".to_string(),
                category: "io".to_string(),
                sub_category: "audio".to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
                output_schema: json!({"status": "str"}),
                config_schema: None,
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 30_000,
            },
            gate,
        }
    }
}

#[async_trait]
impl Skill for SpeakSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let text = inputs
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("speak requires a `text` input".to_string()))?;

        self.gate.begin_speaking();
        let result = self.play(text).await;
        self.gate.end_speaking();
        result?;

        let mut output = HashMap::new();
        output.insert("status".to_string(), Value::String("spoken".to_string()));
        Ok(output)
    }
}

impl SpeakSkill {
    async fn play(&self, _text: &str) -> Result<(), RuntimeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn speaking_toggles_the_gate_and_releases_it_afterward() {
        let gate = AudioGate::new();
        let skill = SpeakSkill::new(Arc::clone(&gate));
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String("hello".to_string()));

        assert!(!gate.is_speaking());
        let output = skill.execute(inputs).await.unwrap();
        assert_eq!(output.get("status").and_then(Value::as_str), Some("spoken"));
        assert!(!gate.is_speaking());
    }

    #[tokio::test]
    async fn missing_text_input_is_a_validation_error() {
        let skill = SpeakSkill::new(AudioGate::new());
        let result = skill.execute(HashMap::new()).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
