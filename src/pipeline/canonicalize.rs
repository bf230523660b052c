//! Normalizes raw completions into parseable JSON text.
//!
//! Only formatting artifacts are removed. Prose around the JSON is not
//! salvaged: a completion that still fails to parse after fence stripping is a
//! fatal error for the stage, reported with the raw text attached.

use serde_json::{Map, Value};

use crate::error::PipelineError;
use crate::llm::Stage;

const FENCE: &str = "```";

/// Strip surrounding whitespace and a wrapping code fence, if any.
///
/// Handles ```` ```json ````, ```` ``` ```` and tagless fences, with or without
/// a closing marker. Text after the closing marker is dropped. Applying it twice gives the same result as applying it once.
pub fn canonicalize(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(after_open) = trimmed.strip_prefix(FENCE) else {
        return trimmed;
    };

    // Language tag, e.g. `json` or `JSON5`, directly after the opening marker.
    let body = after_open.trim_start_matches(|c: char| {
        c.is_ascii_alphanumeric() || c == '-' || c == '_'
    });
    // The closing marker sits on its own line; anything after it is chatter.
    // JSON strings cannot hold a raw newline, so this never cuts inside a value.
    let body = match body.rfind(&format!("\n{}", FENCE)) {
        Some(close) => &body[..close],
        None => body.strip_suffix(FENCE).unwrap_or(body),
    };
    body.trim()
}

/// Canonicalize and parse a completion as a single JSON value.
pub fn parse_completion(stage: Stage, raw: &str) -> Result<Value, PipelineError> {
    let text = canonicalize(raw);
    if text.is_empty() {
        return Err(PipelineError::malformed(stage, "completion is empty", raw));
    }

    serde_json::from_str::<Value>(text).map_err(|e| {
        tracing::debug!(%stage, error = %e, "Completion did not parse as JSON");
        PipelineError::malformed(stage, format!("invalid JSON: {}", e), raw)
    })
}

/// Canonicalize and parse a completion that must be a JSON object.
pub fn parse_object(stage: Stage, raw: &str) -> Result<Map<String, Value>, PipelineError> {
    match parse_completion(stage, raw)? {
        Value::Object(map) => Ok(map),
        other => Err(PipelineError::malformed(
            stage,
            format!("expected a JSON object, got {}", kind_of(&other)),
            raw,
        )),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
