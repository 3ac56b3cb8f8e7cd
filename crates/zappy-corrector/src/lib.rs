#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! The immune system: analyses a failed action's inputs and error message,
//! proposing a patched input map so the Orchestrator can retry in place
//! without a full replan (§4.11).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use zappy_core::json_extract::extract_json;
use zappy_logging::{JsonLogger, LogLevel};
use zappy_model_router::{ChatMessage, ModelRouter, TaskClass};

/// Skill whose failures favour the coding-tier model over the fast-tier
/// default, matching the distilled source's `code_executor` special case.
const CODE_SKILL_NAME: &str = "code_executor";

/// Diagnoses and patches a failed action's inputs (§4.11). Returns `None`
/// on any failure — a model error, an unparseable response, or a
/// non-object JSON value — never propagating an error to the caller.
pub struct Corrector {
    router: Arc<ModelRouter>,
    logger: Option<Arc<JsonLogger>>,
}

impl Corrector {
    /// Wires a model router; logging is opt-in via [`Corrector::with_logger`].
    #[must_use]
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router, logger: None }
    }

    /// Attaches a structured logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<JsonLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Attempts to fix `original_inputs` given the error `skill_name`
    /// raised. Callers are responsible for sanitising the returned map down
    /// to keys the skill's schema actually declares before retrying.
    pub async fn correct(&self, skill_name: &str, original_inputs: &HashMap<String, Value>, error_message: &str) -> Option<HashMap<String, Value>> {
        let task_class = if skill_name == CODE_SKILL_NAME { TaskClass::Coding } else { TaskClass::Fast };
        let prompt = build_prompt(skill_name, original_inputs, error_message);
        let messages = vec![
            ChatMessage::system("You are an automated debugger. Return valid JSON only."),
            ChatMessage::user(prompt),
        ];

        let raw = match self.router.chat(task_class, &messages, 0.0, 2000).await {
            Ok(raw) => raw,
            Err(err) => {
                if let Some(logger) = &self.logger {
                    logger.event(LogLevel::Warn, "corrector.model_call_failed", serde_json::json!({"skill": skill_name, "error": err.to_string()}));
                }
                return None;
            }
        };

        match extract_json(&raw) {
            Some(Value::Object(map)) => Some(map.into_iter().collect()),
            _ => {
                if let Some(logger) = &self.logger {
                    logger.event(LogLevel::Warn, "corrector.unparseable_response", serde_json::json!({"skill": skill_name}));
                }
                None
            }
        }
    }
}

fn build_prompt(skill_name: &str, original_inputs: &HashMap<String, Value>, error_message: &str) -> String {
    let inputs_json = serde_json::to_string_pretty(original_inputs).unwrap_or_else(|_| "{}".to_string());
    format!(
        "A tool execution failed. Your task is to fix the inputs.\n\n\
         Skill: {skill_name}\n\n\
         Original Inputs:\n{inputs_json}\n\n\
         Error Output:\n{error_message}\n\n\
         INSTRUCTIONS:\n\
         1. Analyse why the error occurred (e.g. syntax error, invalid argument, missing file).\n\
         2. Propose new inputs that fix the specific error.\n\
         3. Do not change the intent of the action; only fix implementation details.\n\n\
         Respond with ONLY a valid JSON object containing the fixed inputs."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::{self, BoxStream};
    use zappy_model_router::{ModelCandidate, ModelProvider, ModelRouterError};

    struct FixedProvider {
        reply: Result<String, ()>,
    }

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn chat(&self, _model: &str, _messages: &[ChatMessage], _temperature: f32, _max_tokens: u32) -> Result<String, ModelRouterError> {
            self.reply.clone().map_err(|()| ModelRouterError::Transient {
                provider: "fixed".to_string(),
                detail: "boom".to_string(),
            })
        }

        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
            Ok(Box::pin(stream::empty()))
        }
    }

    fn corrector_with_reply(reply: &str) -> Corrector {
        let router = ModelRouter::builder()
            .provider(Arc::new(FixedProvider { reply: Ok(reply.to_string()) }))
            .priority(TaskClass::Fast, vec![ModelCandidate::new("fixed", "m1")])
            .priority(TaskClass::Coding, vec![ModelCandidate::new("fixed", "m1")])
            .build();
        Corrector::new(Arc::new(router))
    }

    #[tokio::test]
    async fn patches_inputs_from_a_clean_json_reply() {
        let corrector = corrector_with_reply(r#"{"path": "/tmp/fixed.txt"}"#);
        let original = HashMap::from([("path".to_string(), Value::from("/tmp/missing.txt"))]);
        let patched = corrector.correct("file_manager", &original, "file not found").await.unwrap();
        assert_eq!(patched["path"], Value::from("/tmp/fixed.txt"));
    }

    #[tokio::test]
    async fn patches_inputs_wrapped_in_a_fenced_code_block() {
        let corrector = corrector_with_reply("Here is the fix:\n```json\n{\"code\": \"print(1)\"}\n```\n");
        let original = HashMap::from([("code".to_string(), Value::from("print(1"))]);
        let patched = corrector.correct("code_executor", &original, "SyntaxError").await.unwrap();
        assert_eq!(patched["code"], Value::from("print(1)"));
    }

    #[tokio::test]
    async fn unparseable_reply_yields_no_patch() {
        let corrector = corrector_with_reply("I'm not sure how to fix that.");
        let original = HashMap::new();
        assert!(corrector.correct("file_manager", &original, "boom").await.is_none());
    }

    #[tokio::test]
    async fn model_failure_yields_no_patch() {
        let router = ModelRouter::builder().build();
        let corrector = Corrector::new(Arc::new(router));
        let original = HashMap::new();
        assert!(corrector.correct("file_manager", &original, "boom").await.is_none());
    }
}
