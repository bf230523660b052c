use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::canonicalize::parse_object;
use super::overview::OverviewOutput;
use super::prompts::PromptComposer;
use crate::error::PipelineError;
use crate::llm::{CompletionBackend, Stage};
use crate::models::de;
use crate::models::{BusinessRule, Module};

/// Output of the second extraction stage.
///
/// Missing arrays are empty, never absent, so "no modules" and "the stage
/// produced nothing" look the same downstream.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "DetailRecord")]
pub struct DetailOutput {
    pub modules: Vec<Module>,
    pub business_rules: Vec<BusinessRule>,
    pub tech_stack_suggestions: Option<Value>,
    pub ui_ux_guidelines: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailRecord {
    #[serde(default, deserialize_with = "de::null_as_default")]
    modules: Vec<Module>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    business_rules: Vec<BusinessRule>,
    #[serde(default, deserialize_with = "de::non_empty_value")]
    tech_stack_suggestions: Option<Value>,
    #[serde(default, deserialize_with = "de::non_empty_value")]
    ui_ux_guidelines: Option<Value>,
    #[serde(default, rename = "uiuxGuidelines", deserialize_with = "de::non_empty_value")]
    alt_ui_ux_guidelines: Option<Value>,
}

impl From<DetailRecord> for DetailOutput {
    fn from(r: DetailRecord) -> Self {
        DetailOutput {
            modules: r.modules,
            business_rules: r.business_rules,
            tech_stack_suggestions: r.tech_stack_suggestions,
            ui_ux_guidelines: r.ui_ux_guidelines.or(r.alt_ui_ux_guidelines),
        }
    }
}

/// Second stage: overview + document → module tree, rules, and config blobs.
///
/// Runs only after the overview stage has succeeded; its prompt is
/// conditioned on that validated overview.
pub struct DetailExtractor {
    backend: Arc<dyn CompletionBackend>,
    composer: PromptComposer,
}

impl DetailExtractor {
    pub fn new(backend: Arc<dyn CompletionBackend>, composer: PromptComposer) -> Self {
        Self { backend, composer }
    }

    pub async fn extract(
        &self,
        overview: &OverviewOutput,
        document: &str,
    ) -> Result<DetailOutput, PipelineError> {
        let request =
            self.composer
                .detail(&overview.overview, overview.application_type, document);
        let raw = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| PipelineError::backend(Stage::Detail, e))?;

        parse_detail(&raw)
    }
}

pub fn parse_detail(raw: &str) -> Result<DetailOutput, PipelineError> {
    let root = parse_object(Stage::Detail, raw)?;
    let detail: DetailOutput = serde_json::from_value(Value::Object(root))
        .map_err(|e| PipelineError::malformed(Stage::Detail, e.to_string(), raw))?;

    let stories: usize = detail.modules.iter().map(|m| m.user_stories.len()).sum();
    tracing::info!(
        modules = detail.modules.len(),
        user_stories = stories,
        business_rules = detail.business_rules.len(),
        tech_stack = detail.tech_stack_suggestions.is_some(),
        ui_ux = detail.ui_ux_guidelines.is_some(),
        "Extracted project detail"
    );

    Ok(detail)
}
