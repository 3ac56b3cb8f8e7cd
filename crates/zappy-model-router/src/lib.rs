#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Unified chat/stream/embed/intent-classification routing across model
//! providers (§4.1). A task class selects a priority-ordered list of
//! (provider, model) candidates; the first candidate whose provider reports
//! itself configured wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zappy_core::error::RuntimeError;

/// Concrete HTTP-backed [`ModelProvider`] implementations.
pub mod providers;
pub use providers::{AnthropicProvider, OpenAiProvider};

/// A chat turn passed to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `"system" | "user" | "assistant"`.
    pub role: String,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// The class of work a model call is performing, used to pick a priority
/// table (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskClass {
    /// Full DAG synthesis; prefers a strong reasoning model.
    Planning,
    /// Code generation/repair; prefers a coding-tuned model.
    Coding,
    /// Open-ended generation.
    Creative,
    /// Low-latency calls: intent classification, search-phrase synthesis.
    Fast,
    /// General chat fast-path.
    General,
}

/// Output of `classify_intent` (§4.1, §6): exactly one of these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    /// Direct conversational reply, bypassing the planner.
    Chat,
    /// Open-ended research; still routed through the planner.
    Research,
    /// A single skill invocation; the planner may shortcut DAG synthesis.
    SingleAction,
    /// Full multi-step plan required.
    Plan,
}

impl Intent {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "CHAT" => Some(Self::Chat),
            "RESEARCH" => Some(Self::Research),
            "SINGLE_ACTION" => Some(Self::SingleAction),
            "PLAN" => Some(Self::Plan),
            _ => None,
        }
    }
}

/// Errors a [`ModelProvider`] or [`ModelRouter`] may report (§4.1, §7).
#[derive(Debug, Error)]
pub enum ModelRouterError {
    /// No provider for the requested task class reported itself configured.
    #[error("no configured provider available for task class {0:?}")]
    NoProviderConfigured(TaskClass),
    /// The provider's response did not match the expected protocol shape.
    #[error("protocol mismatch with provider {provider}: {detail}")]
    ProtocolMismatch {
        /// Provider name.
        provider: String,
        /// What went wrong.
        detail: String,
    },
    /// The provider call failed transiently (rate limit, 5xx).
    #[error("transient error from provider {provider}: {detail}")]
    Transient {
        /// Provider name.
        provider: String,
        /// What went wrong.
        detail: String,
    },
    /// No provider is capable of embeddings; there is no zero-vector
    /// fallback (§4.1).
    #[error("no embedding-capable provider is configured")]
    NoEmbeddingProvider,
    /// The classifier returned something other than one of the four
    /// recognised intent tokens.
    #[error("classifier returned an unrecognised intent token: {0}")]
    UnrecognisedIntent(String),
}

impl From<ModelRouterError> for RuntimeError {
    fn from(err: ModelRouterError) -> Self {
        match err {
            ModelRouterError::Transient { .. } => Self::TransientModel(err.to_string()),
            _ => Self::Execution(err.to_string()),
        }
    }
}

/// One model provider: an Anthropic-shaped client, an OpenAI-compatible
/// client, or a test fake. Implementations are `async_trait` per the
/// `ReasoningDomain` pattern used elsewhere in this workspace.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable provider name, e.g. `"anthropic"`, `"openai"`.
    fn name(&self) -> &str;

    /// `true` once credentials for this provider are present.
    fn is_configured(&self) -> bool;

    /// `true` if this provider can produce embeddings.
    fn supports_embeddings(&self) -> bool {
        false
    }

    /// A single non-streaming completion.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelRouterError>;

    /// A streaming completion, yielding text chunks as they arrive.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError>;

    /// Embeds `text` into a dense float vector.
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ModelRouterError> {
        let _ = (model, text);
        Err(ModelRouterError::NoEmbeddingProvider)
    }
}

/// One (provider, model) candidate in a [`TaskClass`]'s priority table.
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    /// Provider name, looked up in the router's provider map.
    pub provider: String,
    /// Model identifier passed through to the provider.
    pub model: String,
}

impl ModelCandidate {
    /// Convenience constructor.
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }
}

/// Selects a (provider, model) pair per task class and exposes the unified
/// chat/stream/embed/classify surface (§4.1).
pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    priority: HashMap<TaskClass, Vec<ModelCandidate>>,
}

impl ModelRouter {
    /// Creates an empty router; register providers and priority tables via
    /// [`ModelRouterBuilder`].
    #[must_use]
    pub fn builder() -> ModelRouterBuilder {
        ModelRouterBuilder::default()
    }

    fn select(&self, task_class: TaskClass) -> Result<(Arc<dyn ModelProvider>, String), ModelRouterError> {
        let candidates = self
            .priority
            .get(&task_class)
            .ok_or(ModelRouterError::NoProviderConfigured(task_class))?;
        for candidate in candidates {
            if let Some(provider) = self.providers.get(&candidate.provider) {
                if provider.is_configured() {
                    return Ok((Arc::clone(provider), candidate.model.clone()));
                }
            }
        }
        Err(ModelRouterError::NoProviderConfigured(task_class))
    }

    /// Picks the first embedding-capable configured provider, irrespective
    /// of task-class priority tables (there is only ever one embedding
    /// concern, not five).
    fn select_embedding_provider(&self) -> Result<Arc<dyn ModelProvider>, ModelRouterError> {
        self.providers
            .values()
            .find(|p| p.is_configured() && p.supports_embeddings())
            .cloned()
            .ok_or(ModelRouterError::NoEmbeddingProvider)
    }

    /// Non-streaming chat completion for the given task class.
    pub async fn chat(
        &self,
        task_class: TaskClass,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelRouterError> {
        let (provider, model) = self.select(task_class)?;
        provider.chat(&model, messages, temperature, max_tokens).await
    }

    /// Streaming chat completion for the given task class.
    pub async fn stream_chat(
        &self,
        task_class: TaskClass,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
        let (provider, model) = self.select(task_class)?;
        provider.stream_chat(&model, messages, temperature, max_tokens).await
    }

    /// Embeds `text`. Hard error if no embedding-capable provider is
    /// configured — there is no silent zero-vector fallback.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelRouterError> {
        let provider = self.select_embedding_provider()?;
        // The embedding model name is provider-intrinsic; pass the provider
        // name itself as a sentinel model id for providers with exactly one
        // embedding model.
        provider.embed(provider.name(), text).await
    }

    /// `true` if any embedding-capable provider is currently configured.
    #[must_use]
    pub fn has_embedding_provider(&self) -> bool {
        self.providers.values().any(|p| p.is_configured() && p.supports_embeddings())
    }

    /// Single-token fast-model intent classification (§4.1, §6).
    pub async fn classify_intent(
        &self,
        goal: &str,
        recent_history: &str,
    ) -> Result<Intent, ModelRouterError> {
        let prompt = format!(
            "Classify the user's goal into exactly one word: CHAT, RESEARCH, SINGLE_ACTION, or PLAN.\n\
             Respond with that single word and nothing else.\n\n\
             Recent history:\n{recent_history}\n\nGoal: {goal}"
        );
        let messages = vec![
            ChatMessage::system("You are an intent classifier. Output exactly one token."),
            ChatMessage::user(prompt),
        ];
        let raw = self.chat(TaskClass::Fast, &messages, 0.0, 8).await?;
        Intent::parse(&raw).ok_or_else(|| ModelRouterError::UnrecognisedIntent(raw))
    }
}

/// Builder for [`ModelRouter`], keeping provider registration and priority
/// table construction separate from the router's runtime surface.
#[derive(Default)]
pub struct ModelRouterBuilder {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    priority: HashMap<TaskClass, Vec<ModelCandidate>>,
}

impl ModelRouterBuilder {
    /// Registers a provider under its own [`ModelProvider::name`].
    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// Sets the priority-ordered candidate list for a task class.
    #[must_use]
    pub fn priority(mut self, task_class: TaskClass, candidates: Vec<ModelCandidate>) -> Self {
        self.priority.insert(task_class, candidates);
        self
    }

    /// Finalises the router.
    #[must_use]
    pub fn build(self) -> ModelRouter {
        ModelRouter {
            providers: self.providers,
            priority: self.priority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct FakeProvider {
        name: &'static str,
        configured: bool,
        embeddings: bool,
        reply: String,
    }

    #[async_trait]
    impl ModelProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        fn supports_embeddings(&self) -> bool {
            self.embeddings
        }

        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<String, ModelRouterError> {
            Ok(self.reply.clone())
        }

        async fn stream_chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _temperature: f32,
            _max_tokens: u32,
        ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
            let reply = self.reply.clone();
            Ok(Box::pin(stream::iter(vec![Ok(reply)])))
        }

        async fn embed(&self, _model: &str, text: &str) -> Result<Vec<f32>, ModelRouterError> {
            Ok(vec![text.len() as f32])
        }
    }

    fn router() -> ModelRouter {
        ModelRouter::builder()
            .provider(Arc::new(FakeProvider {
                name: "unconfigured",
                configured: false,
                embeddings: false,
                reply: "PLAN".into(),
            }))
            .provider(Arc::new(FakeProvider {
                name: "fallback",
                configured: true,
                embeddings: true,
                reply: "CHAT".into(),
            }))
            .priority(
                TaskClass::Fast,
                vec![
                    ModelCandidate::new("unconfigured", "m1"),
                    ModelCandidate::new("fallback", "m2"),
                ],
            )
            .build()
    }

    #[tokio::test]
    async fn falls_through_to_configured_provider() {
        let router = router();
        let reply = router
            .chat(TaskClass::Fast, &[ChatMessage::user("hi")], 0.0, 16)
            .await
            .unwrap();
        assert_eq!(reply, "CHAT");
    }

    #[tokio::test]
    async fn classify_intent_parses_known_tokens() {
        let router = router();
        let intent = router.classify_intent("hello there", "").await.unwrap();
        assert_eq!(intent, Intent::Chat);
    }

    #[tokio::test]
    async fn embed_without_provider_is_hard_error() {
        let router = ModelRouter::builder().build();
        assert!(matches!(
            router.embed("x").await,
            Err(ModelRouterError::NoEmbeddingProvider)
        ));
    }
}
