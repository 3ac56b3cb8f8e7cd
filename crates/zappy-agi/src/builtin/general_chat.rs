//! Foundation conversational skill (§4.12 step 4), grounded on
//! `agi/skilldock/skills/general_chat/scripts/agent.py`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use zappy_core::error::RuntimeError;
use zappy_core::skill::{Skill, SkillMetadata};
use zappy_model_router::{ChatMessage, ModelRouter, TaskClass};

/// Handles greetings and non-technical chit-chat via the fast-path model
/// call, without involving the planner or orchestrator.
pub struct GeneralChatSkill {
    metadata: SkillMetadata,
    router: Arc<ModelRouter>,
}

impl GeneralChatSkill {
    /// Wires the model router used to generate replies.
    #[must_use]
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self {
            metadata: SkillMetadata {
                name: "general_chat".to_string(),
                description: "Handle general conversation, greetings, and non-technical questions"
                    .to_string(),
                category: "foundation".to_string(),
                sub_category: String::new(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "message": {"type": "string", "description": "The user's message"},
                        "history": {
                            "type": "array",
                            "items": {"type": "object"},
                            "description": "Preceding {role, content} turns"
                        }
                    },
                    "required": ["message"]
                }),
                output_schema: json!({"reply": "str"}),
                config_schema: None,
                dependencies: vec![],
                version: "1.0.0".to_string(),
                timeout_default_ms: 60_000,
            },
            router,
        }
    }
}

#[async_trait]
impl Skill for GeneralChatSkill {
    fn metadata(&self) -> &SkillMetadata {
        &self.metadata
    }

    async fn execute(&self, inputs: HashMap<String, Value>) -> Result<HashMap<String, Value>, RuntimeError> {
        let message = inputs
            .get("message")
            .and_then(Value::as_str)
            .ok_or_else(|| RuntimeError::Validation("general_chat requires a `message` input".to_string()))?;

        let mut messages = vec![ChatMessage::system(
            "You are a helpful, friendly AI assistant. Engage in general conversation. \
             Be concise, polite, and direct.",
        )];
        if let Some(history) = inputs.get("history").and_then(Value::as_array) {
            for turn in history {
                let role = turn.get("role").and_then(Value::as_str).unwrap_or("user");
                let content = turn.get("content").and_then(Value::as_str).unwrap_or_default();
                messages.push(ChatMessage {
                    role: role.to_string(),
                    content: content.to_string(),
                });
            }
        }
        messages.push(ChatMessage::user(message));

        let reply = self
            .router
            .chat(TaskClass::General, &messages, 0.7, 1024)
            .await
            .map_err(RuntimeError::from)?;

        let mut output = HashMap::new();
        output.insert("reply".to_string(), Value::String(reply));
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, BoxStream};
    use zappy_model_router::{ModelCandidate, ModelProvider, ModelRouterError};

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

    #[tokio::test]
    async fn replies_with_the_model_s_answer() {
        let router = Arc::new(
            ModelRouter::builder()
                .provider(Arc::new(FixedProvider("Nice to meet you!")))
                .priority(TaskClass::General, vec![ModelCandidate::new("fixed", "m1")])
                .build(),
        );
        let skill = GeneralChatSkill::new(router);
        let mut inputs = HashMap::new();
        inputs.insert("message".to_string(), Value::String("hi there".to_string()));
        let output = skill.execute(inputs).await.unwrap();
        assert_eq!(output.get("reply").and_then(Value::as_str), Some("Nice to meet you!"));
    }

    #[tokio::test]
    async fn missing_message_input_is_a_validation_error() {
        let router = Arc::new(ModelRouter::builder().build());
        let skill = GeneralChatSkill::new(router);
        let result = skill.execute(HashMap::new()).await;
        assert!(matches!(result, Err(RuntimeError::Validation(_))));
    }
}
