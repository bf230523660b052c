//! OpenAI-compatible chat completion client.
//!
//! Configuration is via environment variables:
//! - `OPENROUTER_API_KEY` - API key (required)
//! - `BLUEPRINT_LLM_URL` - Base URL (default: `https://openrouter.ai/api/v1`)
//! - `BLUEPRINT_LLM_MODEL` - Model id (default: `google/gemini-2.5-flash`)
//! - `BLUEPRINT_LLM_TIMEOUT_SECS` - Per-call timeout (default: 120)

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{BackendError, ChatMessage, CompletionBackend, CompletionRequest};
use crate::error::PipelineError;

/// Default endpoint.
const DEFAULT_URL: &str = "https://openrouter.ai/api/v1";

/// Default model.
const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Attribution headers OpenRouter uses to identify the calling app.
const REFERER: &str = "http://localhost:3000";
const APP_TITLE: &str = "Blueprint";

/// Backend connection settings, loaded once at process start.
#[derive(Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// Fails fast with [`PipelineError::Configuration`] when the API key is
    /// absent, before any network call is attempted.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let api_key = lookup("OPENROUTER_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                PipelineError::Configuration("OPENROUTER_API_KEY is not set".to_string())
            })?;

        let timeout_secs = match lookup("BLUEPRINT_LLM_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                PipelineError::Configuration(format!(
                    "BLUEPRINT_LLM_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url: lookup("BLUEPRINT_LLM_URL").unwrap_or_else(|| DEFAULT_URL.to_string()),
            api_key,
            model: lookup("BLUEPRINT_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible completion endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    config: BackendConfig,
    client: Client,
}

impl OpenRouterClient {
    pub fn new(config: BackendConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create client from environment variables.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::new(BackendConfig::from_env()?)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            response_format: request.json_response.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        tracing::debug!(
            stage = %request.stage,
            model = %self.config.model,
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| self.transport_error(e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(BackendError::EmptyCompletion)
    }
}

impl OpenRouterClient {
    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.config.timeout)
        } else {
            BackendError::Http(e)
        }
    }
}
