use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, ModelProvider, ModelRouterError};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

/// Anthropic Messages API provider, grounded on `dashflow-anthropic`'s
/// `ChatAnthropic::make_request`: `x-api-key`/`anthropic-version` headers
/// over a bare `reqwest::Client`, system content lifted out of the message
/// array into its own top-level field.
pub struct AnthropicProvider {
    api_key: String,
    api_version: String,
    api_url: String,
    http: reqwest::Client,
}

impl AnthropicProvider {
    /// Builds a provider against the default `api.anthropic.com` endpoint.
    /// An empty `api_key` is accepted — [`ModelProvider::is_configured`]
    /// simply reports `false` and the router skips to the next candidate.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_url: format!("{DEFAULT_BASE_URL}/v1/messages"),
            http: reqwest::Client::new(),
        }
    }

    /// Points this provider at a different endpoint, e.g. a proxy or a
    /// mock server in tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.api_url = format!("{}/v1/messages", base_url.as_ref().trim_end_matches('/'));
        self
    }

    fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system = Vec::new();
        let mut rest = Vec::new();
        for message in messages {
            if message.role == "system" {
                system.push(message.content.clone());
            } else {
                rest.push(AnthropicMessage {
                    role: message.role.clone(),
                    content: message.content.clone(),
                });
            }
        }
        let system = if system.is_empty() { None } else { Some(system.join("\n")) };
        (system, rest)
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> ModelRouterError {
        if status.as_u16() == 429 || status.is_server_error() {
            ModelRouterError::Transient {
                provider: "anthropic".to_string(),
                detail: format!("{status}: {body}"),
            }
        } else {
            ModelRouterError::ProtocolMismatch {
                provider: "anthropic".to_string(),
                detail: format!("{status}: {body}"),
            }
        }
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelRouterError> {
        let (system, messages) = Self::split_system(messages);
        let request = AnthropicRequest {
            model: model.to_string(),
            max_tokens,
            messages,
            system,
            temperature,
        };

        let response = self
            .http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelRouterError::Transient {
                provider: "anthropic".to_string(),
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_http_error(status, &body));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|err| ModelRouterError::ProtocolMismatch {
            provider: "anthropic".to_string(),
            detail: format!("failed to parse response: {err}"),
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");
        Ok(text)
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
        // SSE token-level streaming needs reqwest's `stream` feature, which
        // this workspace does not enable; yield the full reply as one chunk
        // so callers of the streaming surface still get a working result.
        let reply = self.chat(model, messages, temperature, max_tokens).await?;
        Ok(Box::pin(stream::iter(vec![Ok(reply)])))
    }

    async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>, ModelRouterError> {
        Err(ModelRouterError::NoEmbeddingProvider)
    }
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider").field("api_url", &self.api_url).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_without_an_api_key() {
        let provider = AnthropicProvider::new("");
        assert!(!provider.is_configured());
    }

    #[test]
    fn configured_with_an_api_key() {
        let provider = AnthropicProvider::new("sk-ant-test");
        assert!(provider.is_configured());
    }

    #[test]
    fn split_system_lifts_system_messages_out_of_the_turn_list() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hi"),
            ChatMessage::system("also this"),
        ];
        let (system, rest) = AnthropicProvider::split_system(&messages);
        assert_eq!(system.as_deref(), Some("be terse\nalso this"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].role, "user");
    }
}
