//! The extraction and reconciliation pipeline.
//!
//! # Stages
//!
//! 1. [`OverviewExtractor`]: document → overview + application type.
//! 2. [`DetailExtractor`]: overview + document → modules, rules, config blobs.
//! 3. [`HierarchyPersister`]: tree → rows, one independent step per node.
//!
//! [`EnhancementReconciler`] and [`ImplementationPromptGenerator`] work on an
//! existing tree instead of a document.
//!
//! Backend calls within one invocation are strictly sequential: the detail
//! prompt is built from the validated overview. Nothing is retried; a failed
//! stage ends the invocation and no rows are written.

mod canonicalize;
mod detail;
mod implementation;
mod overview;
mod persist;
mod prompts;
mod reconcile;
mod rules;
mod snapshot;

use std::sync::Arc;

pub use canonicalize::{canonicalize, parse_completion, parse_object};
pub use detail::{parse_detail, DetailExtractor, DetailOutput};
pub use implementation::ImplementationPromptGenerator;
pub use overview::{classify_application_type, parse_overview, OverviewExtractor, OverviewOutput};
pub use persist::{persist_hierarchy, HierarchyPersister, HierarchyStore};
pub use prompts::{
    window, FeatureContext, PromptComposer, PromptTemplate, DEFAULT_DOCUMENT_BUDGET,
    DEFAULT_PRIOR_BUDGET, DEFAULT_PRIOR_WINDOW, DETAIL_TEMPLATE, ENHANCEMENT_TEMPLATE,
    IMPLEMENTATION_PROMPT_TEMPLATE, OVERVIEW_TEMPLATE,
};
pub use reconcile::{classify, classify_shape, parse_enhancement, EnhancementReconciler, KIND_FIELD};
pub use rules::{apply_rule_applicability, infer_applicability};
pub use snapshot::{load_project_tree, MAX_PARALLEL_READS};

use crate::error::PipelineError;
use crate::llm::CompletionBackend;
use crate::models::{EnhancementRequest, EnhancementResult, ParsedBrd};

/// One backend client plus the prompt settings, shared by every stage.
///
/// Construct once at startup and pass it around; cloning is cheap.
#[derive(Clone)]
pub struct Pipeline {
    backend: Arc<dyn CompletionBackend>,
    composer: PromptComposer,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self::with_composer(backend, PromptComposer::default())
    }

    pub fn with_composer(backend: Arc<dyn CompletionBackend>, composer: PromptComposer) -> Self {
        Self { backend, composer }
    }

    /// Run both extraction stages over a document.
    ///
    /// Business rules without an `applicableTo` get one inferred from the
    /// extracted module names.
    pub async fn extract_from_document(&self, text: &str) -> Result<ParsedBrd, PipelineError> {
        tracing::info!(chars = text.len(), "Starting extraction");

        let overview = OverviewExtractor::new(self.backend.clone(), self.composer)
            .extract(text)
            .await?;
        let detail = DetailExtractor::new(self.backend.clone(), self.composer)
            .extract(&overview, text)
            .await?;

        let mut tree = ParsedBrd {
            project_overview: overview.overview,
            application_type: overview.application_type,
            modules: detail.modules,
            business_rules: detail.business_rules,
            tech_stack_suggestions: detail.tech_stack_suggestions,
            ui_ux_guidelines: detail.ui_ux_guidelines,
        };
        apply_rule_applicability(&mut tree.business_rules, &tree.modules);

        let counts = tree.counts();
        tracing::info!(
            project = %tree.project_overview.project_name,
            modules = counts.modules,
            user_stories = counts.user_stories,
            features = counts.features,
            "Extraction complete"
        );
        Ok(tree)
    }

    pub async fn reconcile(
        &self,
        tree: &ParsedBrd,
        request: &EnhancementRequest,
    ) -> Result<EnhancementResult, PipelineError> {
        EnhancementReconciler::new(self.backend.clone(), self.composer)
            .reconcile(tree, request)
            .await
    }

    pub async fn generate_feature_prompt(
        &self,
        tree: &ParsedBrd,
        feature_name: &str,
        previous: &[String],
    ) -> Result<String, PipelineError> {
        ImplementationPromptGenerator::new(self.backend.clone(), self.composer)
            .generate(tree, feature_name, previous)
            .await
    }
}
