use std::sync::Arc;

use serde_json::{Map, Value};

use super::canonicalize::parse_object;
use super::prompts::PromptComposer;
use crate::error::PipelineError;
use crate::llm::{CompletionBackend, Stage};
use crate::models::{
    ClassificationSource, EnhancementRequest, EnhancementResult, ParsedBrd, TargetType,
};

/// Field the backend is asked to emit to say which level the fragment is.
pub const KIND_FIELD: &str = "kind";

/// Envelope field wrapping the fragment itself.
const FRAGMENT_FIELD: &str = "updatedObject";

const MESSAGE_FIELD: &str = "message";

/// Applies a natural-language change to one node of an existing hierarchy.
///
/// Returns only the updated fragment. Splicing it into the stored hierarchy is
/// the caller's job (see [`ParsedBrd::splice`]).
pub struct EnhancementReconciler {
    backend: Arc<dyn CompletionBackend>,
    composer: PromptComposer,
}

impl EnhancementReconciler {
    pub fn new(backend: Arc<dyn CompletionBackend>, composer: PromptComposer) -> Self {
        Self { backend, composer }
    }

    pub async fn reconcile(
        &self,
        tree: &ParsedBrd,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, PipelineError> {
        if request.enhancement_request.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "enhancement request is empty".to_string(),
            ));
        }

        let completion = self
            .composer
            .enhancement(tree, request)
            .map_err(|e| PipelineError::InvalidInput(format!("cannot serialize tree: {}", e)))?;
        let raw = self
            .backend
            .complete(&completion)
            .await
            .map_err(|e| PipelineError::backend(Stage::Enhancement, e))?;

        parse_enhancement(&raw, request.target_type)
    }
}

/// Unwrap, classify, and tag an enhancement completion.
///
/// Accepts either the `{kind, message, updatedObject}` envelope or a bare
/// fragment (optionally carrying `kind`).
pub fn parse_enhancement(
    raw: &str,
    hint: Option<TargetType>,
) -> Result<EnhancementResult, PipelineError> {
    let mut root = parse_object(Stage::Enhancement, raw)?;

    let kind = take_string(&mut root, KIND_FIELD);
    let message = take_string(&mut root, MESSAGE_FIELD);

    let mut fragment = match root.remove(FRAGMENT_FIELD) {
        Some(Value::Object(inner)) => inner,
        Some(_) => {
            return Err(PipelineError::malformed(
                Stage::Enhancement,
                "updatedObject is not an object",
                raw,
            ))
        }
        None => root,
    };
    // A kind inside the fragment counts too, but the envelope wins.
    let inner_kind = take_string(&mut fragment, KIND_FIELD);
    let kind = kind.or(inner_kind);

    let (target_type, classified_by) = classify(kind.as_deref(), &fragment, hint);
    if classified_by == ClassificationSource::Fallback {
        tracing::warn!(
            fields = ?fragment.keys().collect::<Vec<_>>(),
            "Enhancement fragment matched no known shape, treating it as a feature"
        );
    }

    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| default_message(target_type, &fragment));

    tracing::info!(
        target_type = target_type.as_str(),
        classified_by = ?classified_by,
        "Reconciled enhancement"
    );

    Ok(EnhancementResult {
        updated_object: Value::Object(fragment),
        target_type,
        classified_by,
        message,
    })
}

/// Decide which hierarchy level a fragment represents.
///
/// Precedence:
/// 1. a valid `kind` discriminator
/// 2. `moduleName` and `userStories` → module
/// 3. `userStory` or `description`, and `features` → user story
/// 4. `featureName` and `taskDescription` → feature
/// 5. the caller's hint
/// 6. feature
pub fn classify(
    kind: Option<&str>,
    fragment: &Map<String, Value>,
    hint: Option<TargetType>,
) -> (TargetType, ClassificationSource) {
    if let Some(target) = kind.and_then(TargetType::from_str) {
        return (target, ClassificationSource::Discriminator);
    }
    if let Some(target) = classify_shape(fragment) {
        return (target, ClassificationSource::Shape);
    }
    match hint {
        Some(target) => (target, ClassificationSource::Hint),
        None => (TargetType::Feature, ClassificationSource::Fallback),
    }
}

/// Structural rules only; `None` when no rule matches.
pub fn classify_shape(fragment: &Map<String, Value>) -> Option<TargetType> {
    let has = |field: &str| fragment.contains_key(field);

    if has("moduleName") && has("userStories") {
        Some(TargetType::Module)
    } else if (has("userStory") || has("description")) && has("features") {
        Some(TargetType::UserStory)
    } else if has("featureName") && has("taskDescription") {
        Some(TargetType::Feature)
    } else {
        None
    }
}

fn take_string(map: &mut Map<String, Value>, field: &str) -> Option<String> {
    match map.remove(field) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // Not ours to drop: put back anything that is not a plain string.
            map.insert(field.to_string(), other);
            None
        }
        None => None,
    }
}

fn default_message(target_type: TargetType, fragment: &Map<String, Value>) -> String {
    let name_field = match target_type {
        TargetType::Module => "moduleName",
        TargetType::UserStory => "title",
        TargetType::Feature => "featureName",
    };
    match fragment.get(name_field).and_then(Value::as_str) {
        Some(name) => format!("Updated {} '{}'", target_type.as_str(), name),
        None => format!("Updated {}", target_type.as_str()),
    }
}
