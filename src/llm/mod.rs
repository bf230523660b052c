//! The generative backend seam.
//!
//! Pipeline stages never talk HTTP directly. They build a [`CompletionRequest`]
//! and hand it to whatever [`CompletionBackend`] was injected at startup: the
//! OpenAI-compatible [`OpenRouterClient`] in production, or a
//! [`ScriptedBackend`] for offline runs and tests.

mod openrouter;
mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openrouter::*;
pub use scripted::*;

/// Sampling temperature for the extraction and reconciliation stages.
pub const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Sampling temperature for free-form prompt generation.
pub const GENERATION_TEMPERATURE: f32 = 0.7;

/// A pipeline stage that calls the backend. Each has its own prompt template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Overview,
    Detail,
    Enhancement,
    ImplementationPrompt,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Detail => "detail",
            Self::Enhancement => "enhancement",
            Self::ImplementationPrompt => "implementation_prompt",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// OpenAI-compatible chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
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

/// A single completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub stage: Stage,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Constrain the response to a single JSON object.
    pub json_response: bool,
}

/// Backend transport errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no completion within {0:?}")]
    Timeout(Duration),

    #[error("server error: HTTP {status} - {body}")]
    Server { status: u16, body: String },

    #[error("backend returned no completion")]
    EmptyCompletion,

    #[error("no scripted response left for stage {0}")]
    Exhausted(Stage),
}

/// Something that turns a chat prompt into a completion.
///
/// Implementations must not retry on their own: a failed call is terminal for
/// the pipeline invocation that made it.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}
