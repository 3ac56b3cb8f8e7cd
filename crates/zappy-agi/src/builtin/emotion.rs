//! Emotion sensing (§4.12 step 1, §8 scenario 4): a fire-and-forget
//! perception module consulted at the start of every `execute` call, and a
//! plan-composable skill of the same model calls used by reflex-triggered
//! plans. Grounded on two distinct distilled-source files —
//! `agi/perception/modules/emotion/system.py` and
//! `agi/skilldock/skills/emotion/scripts/agent.py` — not a single
//! duplicated implementation; the teacher's own architecture keeps the
//! fire-and-forget sense and the plan-composable action separate.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};
use zappy_memory::MemoryStore;
use zappy_model_router::{ChatMessage, ModelRouter, TaskClass};
use zappy_perception::{PerceptionMetadata, PerceptionModule};

async fn detect_human_and_agi_emotion(router: &ModelRouter, text: &str) -> Option<(String, String)> {
    let human = router
        .chat(
            TaskClass::Fast,
            &[
                ChatMessage::system(
                    "You are an emotion detection specialist. Analyze the HUMAN's query and respond \
                     with exactly one word: happy, sad, angry, neutral, curious, or frustrated.",
                ),
                ChatMessage::user(format!("Query: \"{text}\"")),
            ],
            0.0,
            8,
        )
        .await
        .ok()?;
    let agi = router
        .chat(
            TaskClass::Fast,
            &[
                ChatMessage::system(
                    "You are an introspection specialist. Describe how an AI should feel about this \
                     request in exactly one word: helpful, concerned, analytical, cautious, or enthusiastic.",
                ),
                ChatMessage::user(format!("Request: \"{text}\"")),
            ],
            0.0,
            8,
        )
        .await
        .ok()?;
    Some((human.trim().to_lowercase(), agi.trim().to_lowercase()))
}

/// Fire-and-forget emotion sensor consulted at the start of every
/// `Agi::execute` call; updates short-term memory's emotional state as a
/// side effect rather than requiring callers to thread the result through.
pub struct EmotionPerceptionModule {
    metadata: PerceptionMetadata,
    router: Arc<ModelRouter>,
    memory: Arc<MemoryStore>,
}

impl EmotionPerceptionModule {
    /// Wires the model router and the memory store this perception updates.
    #[must_use]
    pub fn new(router: Arc<ModelRouter>, memory: Arc<MemoryStore>) -> Self {
        Self {
            metadata: PerceptionMetadata::new("emotion", "Detects the emotional state of the user and the AGI")
                .with_category("social", "emotional_intelligence"),
            router,
            memory,
        }
    }
}

#[async_trait]
impl PerceptionModule for EmotionPerceptionModule {
    fn metadata(&self) -> &PerceptionMetadata {
        &self.metadata
    }

    async fn perceive(&self, query: Option<&str>) -> Value {
        let Some(query) = query else {
            return json!({"human_emotion": "neutral", "agi_emotion": "neutral"});
        };
        match detect_human_and_agi_emotion(&self.router, query).await {
            Some((human, agi)) => {
                self.memory
                    .short_term()
                    .set_emotional_state(format!("human={human}; agi={agi}"));
                json!({"human_emotion": human, "agi_emotion": agi})
            }
            None => json!({"human_emotion": "neutral", "agi_emotion": "neutral"}),
        }
    }
}

/// Plan-composable emotion-detection skill used by reflex-triggered plans
/// (§8 scenario 4): the same pair of model calls as
/// [`EmotionPerceptionModule`], framed as a [`Skill`] so it can sit ahead of
/// `agi_brain_interface` in a dependency-ordered DAG.
pub struct EmotionDetectionSkill {
    metadata: SkillMetadata,
    router: Arc<ModelRouter>,
    memory: Arc<MemoryStore>,
}

impl EmotionDetectionSkill {
    /// Wires the model router and the memory store this skill updates.
    #[must_use]
    pub fn new(router: Arc<ModelRouter>, memory: Arc<MemoryStore>) -> Self {
        Self {
            metadata: SkillMetadata {
                name: "emotion_detection".to_string(),
                description: "Analyzes text to detect human and AGI emotional states".to_string(),
                category: "social".to_string(),
                sub_category: String::new(),
                input_schema: json!({
                    "type": "object",
                    "properties": {"text": {"type": "string"}},
                    "required": ["text"]
                }),
                output_schema: json!({"human_emotion": "str", "agi_emotion": "str"}),
                config_schema: None,
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 30_000,
            },
            router,
            memory,
        }
    }
}

#[async_trait]
impl Skill for EmotionDetectionSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let text = inputs
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("emotion_detection requires a `text` input".to_string()))?;

        let mut output = HashMap::new();
        match detect_human_and_agi_emotion(&self.router, text).await {
            Some((human, agi)) => {
                self.memory
                    .short_term()
                    .set_emotional_state(format!("human={human}; agi={agi}"));
                output.insert("success".to_string(), Value::Bool(true));
                output.insert("human_emotion".to_string(), Value::String(human));
                output.insert("agi_emotion".to_string(), Value::String(agi));
            }
            None => {
                output.insert("success".to_string(), Value::Bool(false));
                output.insert(
                    "error".to_string(),
                    Value::String("emotion detection model calls failed".to_string()),
                );
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, BoxStream};
    use zappy_memory::long_term::LongTermMemory;
    use zappy_memory::short_term::ShortTermMemory;
    use zappy_model_router::{ModelCandidate, ModelProvider, ModelRouterError};
    use zappy_persistence::{migrate_state_db, Database};

    struct FixedProvider(&'static str);

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, ModelRouterError> {
            Ok(self.0.to_string())
        }
        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
            Ok(Box::pin(stream::iter(vec![Ok(self.0.to_string())])))
        }
    }

    fn memory() -> Arc<MemoryStore> {
        let db = Database::open_in_memory(migrate_state_db).unwrap();
        Arc::new(MemoryStore::new(ShortTermMemory::new(), LongTermMemory::new(db)))
    }

    fn fast_router(reply: &'static str) -> Arc<ModelRouter> {
        Arc::new(
            ModelRouter::builder()
                .provider(Arc::new(FixedProvider(reply)))
                .priority(TaskClass::Fast, vec![ModelCandidate::new("fixed", "m1")])
                .build(),
        )
    }

    #[tokio::test]
    async fn perception_defaults_to_neutral_with_no_query() {
        let module = EmotionPerceptionModule::new(fast_router("happy"), memory());
        let value = module.perceive(None).await;
        assert_eq!(value["human_emotion"], "neutral");
        assert_eq!(value["agi_emotion"], "neutral");
    }

    #[tokio::test]
    async fn perception_detects_and_records_emotional_state() {
        let mem = memory();
        let module = EmotionPerceptionModule::new(fast_router("curious"), Arc::clone(&mem));
        let value = module.perceive(Some("tell me about black holes")).await;
        assert_eq!(value["human_emotion"], "curious");
        let state = mem.short_term().working_memory().emotional_state;
        assert!(state.unwrap().contains("curious"));
    }

    #[tokio::test]
    async fn skill_requires_text_input() {
        let skill = EmotionDetectionSkill::new(fast_router("neutral"), memory());
        let result = skill.execute(HashMap::new()).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }

    #[tokio::test]
    async fn skill_reports_success_with_both_emotions() {
        let skill = EmotionDetectionSkill::new(fast_router("angry"), memory());
        let mut inputs = HashMap::new();
        inputs.insert("text".to_string(), Value::String("this is unacceptable".to_string()));
        let output = skill.execute(inputs).await.unwrap();
        assert_eq!(output.get("success").and_then(Value::as_bool), Some(true));
        assert_eq!(output.get("human_emotion").and_then(Value::as_str), Some("angry"));
    }
}
