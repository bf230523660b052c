//! Prompt templates and message composition for every backend stage.
//!
//! Each stage has one fixed system template carrying a version string, so a
//! change in wording is visible in logs. User messages carry the payload:
//! document text, the validated overview, the serialized tree, or prior
//! generated output, each cut to a character budget.

use std::borrow::Cow;

use crate::llm::{
    ChatMessage, CompletionRequest, Stage, EXTRACTION_TEMPERATURE, GENERATION_TEMPERATURE,
};
use crate::models::{
    ApplicationType, BusinessRule, EnhancementRequest, Feature, Module, ParsedBrd,
    ProjectOverview, UserStory,
};

/// Default character budget for document text in a single call.
pub const DEFAULT_DOCUMENT_BUDGET: usize = 60_000;

/// How many prior generated outputs are replayed as context.
pub const DEFAULT_PRIOR_WINDOW: usize = 3;

/// Character budget for the replayed prior outputs combined.
pub const DEFAULT_PRIOR_BUDGET: usize = 6_000;

const TRUNCATION_MARKER: &str = "\n[... truncated ...]";

/// A fixed, versioned system prompt for one stage.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub stage: Stage,
    pub version: &'static str,
    pub system: &'static str,
}

pub const OVERVIEW_TEMPLATE: PromptTemplate = PromptTemplate {
    stage: Stage::Overview,
    version: "overview-v3",
    system: "You are a senior business analyst. Read the business requirements document \
supplied by the user and summarise the project.\n\
Respond with a single JSON object and nothing else, in exactly this shape:\n\
{\n\
  \"projectOverview\": {\n\
    \"projectName\": string,\n\
    \"projectDescription\": string,\n\
    \"businessIntent\": {\n\
      \"vision\": string,\n\
      \"purpose\": string,\n\
      \"objectives\": [string],\n\
      \"projectScope\": { \"inScope\": [string], \"outOfScope\": [string] }\n\
    },\n\
    \"requirements\": {\n\
      \"functional\": [string],\n\
      \"nonFunctional\": [string],\n\
      \"integration\": [string],\n\
      \"reporting\": [string]\n\
    }\n\
  },\n\
  \"applicationType\": one of the allowed application types\n\
}\n\
Use only facts stated or clearly implied by the document.",
};

pub const DETAIL_TEMPLATE: PromptTemplate = PromptTemplate {
    stage: Stage::Detail,
    version: "detail-v4",
    system: "You are a senior solution architect. Using the validated project overview, the \
application type, and the original business requirements document, break the project down \
into modules, user stories, and features.\n\
Respond with a single JSON object and nothing else, in exactly this shape:\n\
{\n\
  \"modules\": [{\n\
    \"moduleName\": string,\n\
    \"moduleDescription\": string,\n\
    \"priority\": \"High\" | \"Medium\" | \"Low\",\n\
    \"businessImpact\": string,\n\
    \"dependencies\": [moduleName],\n\
    \"userStories\": [{\n\
      \"title\": \"As a <role>, I want <goal> so that <benefit>\",\n\
      \"userRole\": string,\n\
      \"description\": string,\n\
      \"acceptanceCriteria\": [string],\n\
      \"priority\": \"High\" | \"Medium\" | \"Low\",\n\
      \"features\": [{\n\
        \"featureName\": string,\n\
        \"taskDescription\": string,\n\
        \"priority\": \"High\" | \"Medium\" | \"Low\",\n\
        \"estimatedHours\": number,\n\
        \"businessRules\": string\n\
      }]\n\
    }]\n\
  }],\n\
  \"businessRules\": [{ \"ruleName\": string, \"ruleDescription\": string, \"applicableTo\": [moduleName or \"all\"] }],\n\
  \"techStackSuggestions\": { \"<layer>\": [string] },\n\
  \"uiUxGuidelines\": { \"<topic>\": string }\n\
}\n\
Every user story belongs to exactly one module and every feature to exactly one user story. \
Omit techStackSuggestions or uiUxGuidelines if the document gives no basis for them.",
};

pub const ENHANCEMENT_TEMPLATE: PromptTemplate = PromptTemplate {
    stage: Stage::Enhancement,
    version: "enhancement-v2",
    system: "You maintain a project hierarchy of modules, user stories, and features. The user \
gives you the current hierarchy as JSON and a change request. Locate the single node the request \
refers to, apply the change, and return ONLY that updated node, not the whole hierarchy.\n\
Respond with a single JSON object and nothing else, in exactly this shape:\n\
{\n\
  \"kind\": \"module\" | \"userStory\" | \"feature\",\n\
  \"message\": one sentence describing the change,\n\
  \"updatedObject\": the updated node\n\
}\n\
A module node has moduleName, moduleDescription, priority, businessImpact, dependencies and \
userStories. A user story node has title, userRole, description, acceptanceCriteria, priority \
and features. A feature node has featureName, taskDescription, priority, estimatedHours and \
businessRules. Keep the node's existing \"id\" if it has one. Keep every field the request does \
not ask to change.",
};

pub const IMPLEMENTATION_PROMPT_TEMPLATE: PromptTemplate = PromptTemplate {
    stage: Stage::ImplementationPrompt,
    version: "implementation-prompt-v1",
    system: "You write implementation prompts for an AI coding assistant. Given one feature and \
its surrounding context, write a self-contained prompt that tells the assistant what to build, \
which constraints and business rules apply, and how to verify the result. Stay consistent with \
the previously generated prompts you are shown. Respond with the prompt text only.",
};

/// Builds the message pair for every stage.
#[derive(Debug, Clone, Copy)]
pub struct PromptComposer {
    pub document_budget: usize,
    pub prior_window: usize,
    pub prior_budget: usize,
}

impl Default for PromptComposer {
    fn default() -> Self {
        Self {
            document_budget: DEFAULT_DOCUMENT_BUDGET,
            prior_window: DEFAULT_PRIOR_WINDOW,
            prior_budget: DEFAULT_PRIOR_BUDGET,
        }
    }
}

/// Everything the implementation-prompt stage needs to know about one feature.
#[derive(Debug, Clone)]
pub struct FeatureContext<'a> {
    pub project_name: &'a str,
    pub application_type: ApplicationType,
    pub module: &'a Module,
    pub story: &'a UserStory,
    pub feature: &'a Feature,
    pub rules: Vec<&'a BusinessRule>,
    pub tech_stack: Option<&'a serde_json::Value>,
}

impl PromptComposer {
    pub fn overview(&self, document: &str) -> CompletionRequest {
        let user = format!(
            "Allowed application types: {}\n\nBusiness requirements document:\n{}",
            ApplicationType::choices(),
            window(document, self.document_budget)
        );
        json_request(&OVERVIEW_TEMPLATE, user)
    }

    pub fn detail(
        &self,
        overview: &ProjectOverview,
        application_type: ApplicationType,
        document: &str,
    ) -> CompletionRequest {
        let overview_json =
            serde_json::to_string_pretty(overview).unwrap_or_else(|_| "{}".to_string());
        let user = format!(
            "Application type: {}\n\nValidated project overview:\n{}\n\nBusiness requirements document:\n{}",
            application_type,
            overview_json,
            window(document, self.document_budget)
        );
        json_request(&DETAIL_TEMPLATE, user)
    }

    pub fn enhancement(
        &self,
        tree: &ParsedBrd,
        request: &EnhancementRequest,
    ) -> Result<CompletionRequest, serde_json::Error> {
        let tree_json = serde_json::to_string_pretty(tree)?;
        let mut user = format!(
            "Current hierarchy:\n{}\n\nChange request:\n{}",
            window(&tree_json, self.document_budget),
            request.enhancement_request.trim()
        );
        if let Some(target_type) = request.target_type {
            user.push_str(&format!("\n\nThe change targets a {} node.", target_type.as_str()));
        }
        if let Some(target_id) = request.target_id {
            user.push_str(&format!("\nThe target node has id \"{}\".", target_id));
        }
        Ok(json_request(&ENHANCEMENT_TEMPLATE, user))
    }

    pub fn implementation_prompt(
        &self,
        context: &FeatureContext<'_>,
        previous: &[String],
    ) -> CompletionRequest {
        let mut user = format!(
            "Project: {} ({})\n\nModule: {}\n{}\n\nUser story: {}\nRole: {}\n{}\n",
            context.project_name,
            context.application_type,
            context.module.module_name,
            context.module.module_description,
            context.story.title,
            context.story.user_role,
            context.story.description,
        );
        if !context.story.acceptance_criteria.is_empty() {
            user.push_str("Acceptance criteria:\n");
            for criterion in &context.story.acceptance_criteria {
                user.push_str(&format!("- {}\n", criterion));
            }
        }
        user.push_str(&format!(
            "\nFeature: {} (priority {})\n{}\n",
            context.feature.feature_name,
            context.feature.priority.as_str(),
            context.feature.task_description
        ));
        if let Some(rules) = &context.feature.business_rules {
            user.push_str(&format!("Feature rules: {}\n", rules));
        }
        if !context.rules.is_empty() {
            user.push_str("\nProject business rules:\n");
            for rule in &context.rules {
                user.push_str(&format!("- {}: {}\n", rule.rule_name, rule.rule_description));
            }
        }
        if let Some(stack) = context.tech_stack {
            user.push_str(&format!("\nTech stack:\n{}\n", stack));
        }
        let prior = self.prior_outputs(previous);
        if !prior.is_empty() {
            user.push_str("\nPreviously generated prompts (most recent last):\n");
            user.push_str(&prior);
        }

        CompletionRequest {
            stage: IMPLEMENTATION_PROMPT_TEMPLATE.stage,
            messages: vec![
                ChatMessage::system(IMPLEMENTATION_PROMPT_TEMPLATE.system),
                ChatMessage::user(user),
            ],
            temperature: GENERATION_TEMPERATURE,
            json_response: false,
        }
    }

    /// The most recent `prior_window` outputs, oldest first, within `prior_budget`.
    ///
    /// When the budget runs out the oldest outputs are dropped first.
    fn prior_outputs(&self, previous: &[String]) -> String {
        let start = previous.len().saturating_sub(self.prior_window);
        let mut kept: Vec<String> = Vec::new();
        let mut remaining = self.prior_budget;
        for output in previous[start..].iter().rev() {
            if remaining == 0 {
                break;
            }
            let piece = window(output.trim(), remaining);
            remaining = remaining.saturating_sub(piece.chars().count());
            kept.push(format!("---\n{}\n", piece));
        }
        kept.reverse();
        kept.concat()
    }
}

fn json_request(template: &PromptTemplate, user: String) -> CompletionRequest {
    tracing::debug!(
        stage = %template.stage,
        template = template.version,
        chars = user.len(),
        "Composed prompt"
    );
    CompletionRequest {
        stage: template.stage,
        messages: vec![ChatMessage::system(template.system), ChatMessage::user(user)],
        temperature: EXTRACTION_TEMPERATURE,
        json_response: true,
    }
}

/// Cut `text` to at most `budget` characters, marking the cut.
pub fn window(text: &str, budget: usize) -> Cow<'_, str> {
    match text.char_indices().nth(budget) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => Cow::Owned(format!("{}{}", &text[..cut], TRUNCATION_MARKER)),
    }
}
