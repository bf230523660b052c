use std::sync::Arc;

use super::prompts::{FeatureContext, PromptComposer};
use crate::error::PipelineError;
use crate::llm::{BackendError, CompletionBackend, Stage};
use crate::models::ParsedBrd;

/// Writes a coding-assistant prompt for one feature of a tree.
///
/// Unlike the extraction stages this one runs in free-text mode at the higher
/// generation temperature, with recent prior outputs replayed for consistency.
pub struct ImplementationPromptGenerator {
    backend: Arc<dyn CompletionBackend>,
    composer: PromptComposer,
}

impl ImplementationPromptGenerator {
    pub fn new(backend: Arc<dyn CompletionBackend>, composer: PromptComposer) -> Self {
        Self { backend, composer }
    }

    /// Generate the prompt for `feature_name`, oldest `previous` output first.
    pub async fn generate(
        &self,
        tree: &ParsedBrd,
        feature_name: &str,
        previous: &[String],
    ) -> Result<String, PipelineError> {
        let Some((module, story, feature)) = tree.find_feature(feature_name) else {
            return Err(PipelineError::InvalidInput(format!(
                "feature '{}' not found",
                feature_name
            )));
        };

        let context = FeatureContext {
            project_name: &tree.project_overview.project_name,
            application_type: tree.application_type,
            module,
            story,
            feature,
            rules: tree
                .business_rules
                .iter()
                .filter(|rule| rule.applies_to(&module.module_name))
                .collect(),
            tech_stack: tree.tech_stack_suggestions.as_ref(),
        };
        let request = self.composer.implementation_prompt(&context, previous);

        let text = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| PipelineError::backend(Stage::ImplementationPrompt, e))?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::backend(
                Stage::ImplementationPrompt,
                BackendError::EmptyCompletion,
            ));
        }

        tracing::info!(
            feature = %feature.feature_name,
            rules = context.rules.len(),
            chars = text.len(),
            "Generated implementation prompt"
        );
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedBackend;
    use crate::models::{BusinessRule, Feature, Module, UserStory};

    fn tree() -> ParsedBrd {
        let mut tree = ParsedBrd::default();
        tree.project_overview.project_name = "Task Tracker".to_string();
        tree.modules = vec![Module {
            module_name: "Authentication".to_string(),
            user_stories: vec![UserStory {
                title: "Log in".to_string(),
                features: vec![Feature {
                    feature_name: "Login form".to_string(),
                    task_description: "Email and password form".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }];
        tree.business_rules = vec![
            BusinessRule {
                rule_name: "Password policy".to_string(),
                rule_description: "12 characters".to_string(),
                applicable_to: vec!["Authentication".to_string()],
            },
            BusinessRule {
                rule_name: "Invoice rounding".to_string(),
                rule_description: "Round to cents".to_string(),
                applicable_to: vec!["Billing".to_string()],
            },
        ];
        tree
    }

    #[tokio::test]
    async fn test_generates_with_applicable_rules_only() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_reply(Stage::ImplementationPrompt, "  Build the login form.\n"),
        );
        let generator = ImplementationPromptGenerator::new(backend.clone(), PromptComposer::default());

        let previous = vec!["Earlier prompt".to_string()];
        let text = generator.generate(&tree(), "login form", &previous).await.unwrap();
        assert_eq!(text, "Build the login form.");

        let request = &backend.requests()[0];
        let user = &request.messages[1].content;
        assert!(user.contains("Password policy"));
        assert!(!user.contains("Invoice rounding"));
        assert!(user.contains("Earlier prompt"));
        assert!(!request.json_response);
    }

    #[tokio::test]
    async fn test_unknown_feature_is_invalid_input() {
        let backend = Arc::new(ScriptedBackend::new());
        let generator = ImplementationPromptGenerator::new(backend.clone(), PromptComposer::default());

        let err = generator.generate(&tree(), "Checkout", &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert_eq!(backend.calls(Stage::ImplementationPrompt), 0);
    }
}
