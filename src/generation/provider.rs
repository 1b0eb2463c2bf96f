//! Upstream text-completion streaming
//!
//! The provider is an opaque capability: given a request it yields the raw
//! payload of every upstream unit. Decoding payloads into fragments is the
//! pipeline's job, so a provider never fails on a single bad unit.

use crate::config::GenerationConfig;
use crate::error::{Error, Result};
use crate::generation::sse::DataLineDecoder;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upstream end-of-stream marker payload
pub const DONE_PAYLOAD: &str = "[DONE]";

/// One chat message sent upstream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A streamed completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }
}

/// Raw upstream payloads, one per unit
pub type PayloadStream = BoxStream<'static, Result<String>>;

/// Provider-agnostic streaming completion capability
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a streamed completion
    async fn open(&self, request: &CompletionRequest) -> Result<PayloadStream>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// =============================================================================
// OpenAI-compatible provider
// =============================================================================

/// Streams from any OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiProvider {
    pub fn from_config(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "No API key for generation provider; upstream requests will be unauthenticated"
            );
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn open(&self, request: &CompletionRequest) -> Result<PayloadStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: &request.messages,
            stream: true,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut builder = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("HTTP {}: {}", status, text)));
        }

        let mut body = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut decoder = DataLineDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(Error::Upstream(format!("stream interrupted: {}", e)));
                        return;
                    }
                };
                for payload in decoder.push(&chunk) {
                    if payload == DONE_PAYLOAD {
                        return;
                    }
                    yield Ok(payload);
                }
            }
            for payload in decoder.finish() {
                if payload == DONE_PAYLOAD {
                    return;
                }
                yield Ok(payload);
            }
        };

        Ok(stream.boxed())
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-test",
            messages: &messages,
            stream: true,
            max_tokens: Some(4096),
            temperature: Some(0.0),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-test");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 4096);
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_optional_fields_omitted() {
        let messages = vec![ChatMessage::user("hi")];
        let body = ChatCompletionRequest {
            model: "gpt-test",
            messages: &messages,
            stream: true,
            max_tokens: None,
            temperature: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_from_config_trims_base_url() {
        let config = GenerationConfig {
            base_url: "http://localhost:11434/v1/".to_string(),
            api_key_env: "INSIGHTMAP_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        let provider = OpenAiProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434/v1");
        assert!(provider.api_key.is_none());
        assert_eq!(provider.name(), "openai-compatible");
    }

    #[tokio::test]
    async fn test_open_unreachable_upstream() {
        let config = GenerationConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key_env: "INSIGHTMAP_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let provider = OpenAiProvider::from_config(&config).unwrap();
        let result = provider
            .open(&CompletionRequest::new(vec![ChatMessage::user("hi")]))
            .await;
        assert!(matches!(result, Err(Error::Upstream(_))));
    }
}
