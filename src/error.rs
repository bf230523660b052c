//! Pipeline error taxonomy.
//!
//! Stage-level errors abort the pipeline invocation that raised them.
//! Persistence failures are not errors here; they are recorded per item in a
//! [`PersistenceReport`](crate::models::PersistenceReport).

use thiserror::Error;

use crate::llm::{BackendError, Stage};

/// Raw text kept on a [`PipelineError::MalformedOutput`] is cut to this many
/// bytes in `Display` output; the full text stays on the error.
const RAW_PREVIEW_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Backend credentials or settings are missing. Raised before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend call failed, timed out, or returned no completion.
    #[error("{stage} stage: backend error: {message}")]
    Backend { stage: Stage, message: String },

    /// The completion is not valid JSON, or lacks a field the stage requires.
    #[error("{stage} stage: malformed output: {reason} (raw: {})", preview(.raw))]
    MalformedOutput {
        stage: Stage,
        reason: String,
        raw: String,
    },

    /// The caller supplied something the stage cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl PipelineError {
    pub fn backend(stage: Stage, source: BackendError) -> Self {
        Self::Backend {
            stage,
            message: source.to_string(),
        }
    }

    pub fn malformed(stage: Stage, reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedOutput {
            stage,
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// The offending completion text, if this error carries one.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::MalformedOutput { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

fn preview(raw: &str) -> String {
    if raw.len() <= RAW_PREVIEW_LIMIT {
        return raw.to_string();
    }
    let mut end = RAW_PREVIEW_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}
