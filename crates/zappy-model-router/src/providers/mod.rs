//! Concrete [`crate::ModelProvider`] implementations backed by real HTTP
//! APIs, grounded on `dashflow-anthropic`'s `ChatAnthropic` client (request
//! shape, auth headers, error mapping) and adapted to the OpenAI-compatible
//! chat-completions shape for the `openai`/`openai_compatible` providers
//! named by `RuntimeConfig::from_env`.

/// Anthropic Messages API client.
pub mod anthropic;
/// OpenAI (and OpenAI-compatible) chat-completions API client.
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
