use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};

use crate::{ChatMessage, ModelProvider, ModelRouterError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// OpenAI (and OpenAI-compatible, e.g. a local Ollama/vLLM gateway) chat
/// and embeddings provider. Registered twice by a full bootstrap — once as
/// `"openai"` against the public API, once as `"openai_compatible"` against
/// a self-hosted base URL — matching `RuntimeConfig::KNOWN_PROVIDERS`.
pub struct OpenAiProvider {
    name: String,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiProvider {
    /// Builds a provider named `name` (typically `"openai"` or
    /// `"openai_compatible"`) against the public API endpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Points this provider at a different base URL, e.g. a self-hosted
    /// OpenAI-compatible gateway.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_string();
        self
    }

    fn map_http_error(&self, status: reqwest::StatusCode, body: &str) -> ModelRouterError {
        if status.as_u16() == 429 || status.is_server_error() {
            ModelRouterError::Transient {
                provider: self.name.clone(),
                detail: format!("{status}: {body}"),
            }
        } else {
            ModelRouterError::ProtocolMismatch {
                provider: self.name.clone(),
                detail: format!("{status}: {body}"),
            }
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelRouterError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| ChatCompletionMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature,
            max_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelRouterError::Transient {
                provider: self.name.clone(),
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body));
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|err| ModelRouterError::ProtocolMismatch {
            provider: self.name.clone(),
            detail: format!("failed to parse response: {err}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ModelRouterError::ProtocolMismatch {
                provider: self.name.clone(),
                detail: "response carried no choices".to_string(),
            })
    }

    async fn stream_chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<BoxStream<'static, Result<String, ModelRouterError>>, ModelRouterError> {
        let reply = self.chat(model, messages, temperature, max_tokens).await?;
        Ok(Box::pin(stream::iter(vec![Ok(reply)])))
    }

    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ModelRouterError> {
        let request = EmbeddingRequest { model, input: text };
        let response = self
            .http
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ModelRouterError::Transient {
                provider: self.name.clone(),
                detail: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.map_http_error(status, &body));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|err| ModelRouterError::ProtocolMismatch {
            provider: self.name.clone(),
            detail: format!("failed to parse response: {err}"),
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| ModelRouterError::ProtocolMismatch {
                provider: self.name.clone(),
                detail: "response carried no embedding data".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_without_an_api_key() {
        let provider = OpenAiProvider::new("openai", "");
        assert!(!provider.is_configured());
    }

    #[test]
    fn reports_its_own_registered_name() {
        let provider = OpenAiProvider::new("openai_compatible", "key");
        assert_eq!(provider.name(), "openai_compatible");
        assert!(provider.supports_embeddings());
    }
}
