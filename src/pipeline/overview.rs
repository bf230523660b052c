use std::sync::Arc;

use serde_json::{Map, Value};

use super::canonicalize::parse_object;
use super::prompts::PromptComposer;
use crate::error::PipelineError;
use crate::llm::{CompletionBackend, Stage};
use crate::models::{ApplicationType, ProjectOverview};

/// Output of the first extraction stage.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewOutput {
    pub overview: ProjectOverview,
    pub application_type: ApplicationType,
    /// True when the backend's application type was missing or unknown and
    /// the default was substituted.
    pub application_type_defaulted: bool,
}

/// First stage: document text → overview + application type.
pub struct OverviewExtractor {
    backend: Arc<dyn CompletionBackend>,
    composer: PromptComposer,
}

impl OverviewExtractor {
    pub fn new(backend: Arc<dyn CompletionBackend>, composer: PromptComposer) -> Self {
        Self { backend, composer }
    }

    pub async fn extract(&self, document: &str) -> Result<OverviewOutput, PipelineError> {
        if document.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "document text is empty".to_string(),
            ));
        }

        let request = self.composer.overview(document);
        let raw = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| PipelineError::backend(Stage::Overview, e))?;

        parse_overview(&raw)
    }
}

/// Validate an overview completion.
///
/// `projectName` and `projectDescription` must be present, non-blank strings.
/// An unknown application type degrades to the default with a warning.
pub fn parse_overview(raw: &str) -> Result<OverviewOutput, PipelineError> {
    let root = parse_object(Stage::Overview, raw)?;

    let overview_map = match root.get("projectOverview") {
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(PipelineError::malformed(
                Stage::Overview,
                "projectOverview is not an object",
                raw,
            ))
        }
        None => {
            return Err(PipelineError::malformed(
                Stage::Overview,
                "missing projectOverview",
                raw,
            ))
        }
    };

    for field in ["projectName", "projectDescription"] {
        require_string(overview_map, field, raw)?;
    }

    let overview: ProjectOverview = serde_json::from_value(Value::Object(overview_map.clone()))
        .map_err(|e| PipelineError::malformed(Stage::Overview, e.to_string(), raw))?;

    let raw_type = root
        .get("applicationType")
        .or_else(|| overview_map.get("applicationType"));
    let (application_type, application_type_defaulted) = classify_application_type(raw_type);
    if application_type_defaulted {
        tracing::warn!(
            received = ?raw_type,
            default = %application_type,
            "Unrecognised application type, using default"
        );
    }

    tracing::info!(
        project = %overview.project_name,
        application_type = %application_type,
        "Extracted project overview"
    );

    Ok(OverviewOutput {
        overview,
        application_type,
        application_type_defaulted,
    })
}

/// Map a raw `applicationType` value onto the closed set.
///
/// Returns the type and whether the default had to be substituted.
pub fn classify_application_type(raw: Option<&Value>) -> (ApplicationType, bool) {
    match raw.and_then(Value::as_str).and_then(ApplicationType::from_str) {
        Some(kind) => (kind, false),
        None => (ApplicationType::default(), true),
    }
}

fn require_string(map: &Map<String, Value>, field: &str, raw: &str) -> Result<(), PipelineError> {
    match map.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
        Some(Value::String(_)) => Err(PipelineError::malformed(
            Stage::Overview,
            format!("projectOverview.{} is blank", field),
            raw,
        )),
        Some(_) => Err(PipelineError::malformed(
            Stage::Overview,
            format!("projectOverview.{} is not a string", field),
            raw,
        )),
        None => Err(PipelineError::malformed(
            Stage::Overview,
            format!("missing projectOverview.{}", field),
            raw,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn completion(application_type: Value) -> String {
        json!({
            "projectOverview": {
                "projectName": "Task Tracker",
                "projectDescription": "Track tasks across a team",
                "businessIntent": { "objectives": ["Ship faster"] }
            },
            "applicationType": application_type
        })
        .to_string()
    }

    #[test]
    fn test_known_application_type() {
        let output = parse_overview(&completion(json!("Microservices"))).unwrap();
        assert_eq!(output.application_type, ApplicationType::Microservices);
        assert!(!output.application_type_defaulted);
        assert_eq!(output.overview.business_intent.objectives, vec!["Ship faster"]);
    }

    #[test]
    fn test_unknown_application_type_defaults() {
        for value in [json!("Quantum Mainframe"), json!(null), json!(7)] {
            let output = parse_overview(&completion(value)).unwrap();
            assert_eq!(output.application_type, ApplicationType::WebApplication);
            assert!(output.application_type_defaulted);
        }
    }

    #[test]
    fn test_missing_project_name_is_malformed() {
        let raw = json!({
            "projectOverview": { "projectDescription": "No name" },
            "applicationType": "Website"
        })
        .to_string();
        let err = parse_overview(&raw).unwrap_err();
        assert!(err.to_string().contains("projectName"));
        assert_eq!(err.raw_output(), Some(raw.as_str()));
    }

    #[test]
    fn test_non_string_description_is_malformed() {
        let raw = json!({
            "projectOverview": { "projectName": "X", "projectDescription": ["a"] }
        })
        .to_string();
        let err = parse_overview(&raw).unwrap_err();
        assert!(err.to_string().contains("not a string"));
    }

    #[test]
    fn test_missing_overview_is_malformed() {
        let err = parse_overview("{\"applicationType\": \"Website\"}").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput { .. }));
    }
}
