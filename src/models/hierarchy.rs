use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::de;
use super::{ApplicationType, BusinessRule, EnhancementFragment, ProjectOverview};

/// Relative importance of a module, story, or feature.
///
/// Parsing is case-insensitive and never fails: `critical` maps to `High`,
/// anything unrecognised (including `null`) maps to the default `Medium`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" | "critical" | "must" | "must have" => Some(Self::High),
            "medium" | "normal" | "should" | "should have" => Some(Self::Medium),
            "low" | "could" | "could have" | "nice to have" => Some(Self::Low),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Priority::from_str(&s).unwrap_or_default(),
            _ => Priority::default(),
        })
    }
}

/// A functional area of the project, owning user stories.
///
/// At extraction time a module has no id; its identity is its position in
/// [`ParsedBrd::modules`]. The id is assigned when the module is persisted and
/// carried on trees read back from the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "ModuleRecord")]
pub struct Module {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub module_name: String,
    pub module_description: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_impact: Option<String>,
    pub dependencies: Vec<String>,
    pub user_stories: Vec<UserStory>,
}

/// A user-facing need within a module, owning features.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "UserStoryRecord")]
pub struct UserStory {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Story title, typically in "As a... I want..." form.
    pub title: String,
    pub user_role: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub priority: Priority,
    pub features: Vec<Feature>,
}

/// An implementable unit of work within a user story.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "FeatureRecord")]
pub struct Feature {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub feature_name: String,
    pub task_description: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    /// Feature-specific rule text, distinct from the project-wide [`BusinessRule`]s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_rules: Option<String>,
}

/// The canonical document shape: everything extracted from one BRD.
///
/// This is also the shape a stored project is serialized to when it is handed
/// to the reconciler, so it round-trips through the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", from = "ParsedBrdRecord")]
pub struct ParsedBrd {
    pub project_overview: ProjectOverview,
    pub application_type: ApplicationType,
    pub modules: Vec<Module>,
    pub business_rules: Vec<BusinessRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack_suggestions: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_ux_guidelines: Option<Value>,
}

// ============================================================
// Wire records
// ============================================================
//
// Completions use alternate key names (`name`, `description`, `userStory`)
// and sometimes send them next to the canonical key. Each alternate is its
// own field here and only fills the canonical one when that is blank.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModuleRecord {
    #[serde(default, deserialize_with = "de::lenient_uuid")]
    id: Option<Uuid>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    module_name: String,
    #[serde(default, rename = "name", deserialize_with = "de::lenient_string")]
    alt_name: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    module_description: String,
    #[serde(default, rename = "description", deserialize_with = "de::lenient_string")]
    alt_description: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default, deserialize_with = "de::lenient_text")]
    business_impact: Option<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    dependencies: Vec<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    user_stories: Vec<UserStory>,
}

impl From<ModuleRecord> for Module {
    fn from(r: ModuleRecord) -> Self {
        Module {
            id: r.id,
            module_name: de::prefer(r.module_name, r.alt_name),
            module_description: de::prefer(r.module_description, r.alt_description),
            priority: r.priority,
            business_impact: r.business_impact,
            dependencies: r.dependencies,
            user_stories: r.user_stories,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserStoryRecord {
    #[serde(default, deserialize_with = "de::lenient_uuid")]
    id: Option<Uuid>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    title: String,
    #[serde(default, rename = "userStory", deserialize_with = "de::lenient_string")]
    alt_title: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    user_role: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    description: String,
    #[serde(default, deserialize_with = "de::string_list")]
    acceptance_criteria: Vec<String>,
    #[serde(default)]
    priority: Priority,
    #[serde(default, deserialize_with = "de::null_as_default")]
    features: Vec<Feature>,
}

impl From<UserStoryRecord> for UserStory {
    fn from(r: UserStoryRecord) -> Self {
        UserStory {
            id: r.id,
            title: de::prefer(r.title, r.alt_title),
            user_role: r.user_role,
            description: r.description,
            acceptance_criteria: r.acceptance_criteria,
            priority: r.priority,
            features: r.features,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeatureRecord {
    #[serde(default, deserialize_with = "de::lenient_uuid")]
    id: Option<Uuid>,
    #[serde(default, deserialize_with = "de::lenient_string")]
    feature_name: String,
    #[serde(default, rename = "title", deserialize_with = "de::lenient_string")]
    alt_name: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    task_description: String,
    #[serde(default, rename = "description", deserialize_with = "de::lenient_string")]
    alt_description: String,
    #[serde(default)]
    priority: Priority,
    #[serde(default, deserialize_with = "de::lenient_hours")]
    estimated_hours: Option<f64>,
    #[serde(default, deserialize_with = "de::lenient_text")]
    business_rules: Option<String>,
}

impl From<FeatureRecord> for Feature {
    fn from(r: FeatureRecord) -> Self {
        Feature {
            id: r.id,
            feature_name: de::prefer(r.feature_name, r.alt_name),
            task_description: de::prefer(r.task_description, r.alt_description),
            priority: r.priority,
            estimated_hours: r.estimated_hours,
            business_rules: r.business_rules,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsedBrdRecord {
    project_overview: ProjectOverview,
    #[serde(default)]
    application_type: ApplicationType,
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

impl From<ParsedBrdRecord> for ParsedBrd {
    fn from(r: ParsedBrdRecord) -> Self {
        ParsedBrd {
            project_overview: r.project_overview,
            application_type: r.application_type,
            modules: r.modules,
            business_rules: r.business_rules,
            tech_stack_suggestions: r.tech_stack_suggestions,
            ui_ux_guidelines: r.ui_ux_guidelines.or(r.alt_ui_ux_guidelines),
        }
    }
}

/// Where a spliced fragment landed, or why it did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SpliceOutcome {
    /// The node at `path` (e.g. `"Auth / Sign in / Login form"`) was replaced.
    Replaced { path: String },
    NotFound,
}

/// Counts of nodes per hierarchy level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyCounts {
    pub modules: usize,
    pub user_stories: usize,
    pub features: usize,
}

impl ParsedBrd {
    pub fn counts(&self) -> HierarchyCounts {
        let user_stories = self.modules.iter().map(|m| m.user_stories.len()).sum();
        let features = self
            .modules
            .iter()
            .flat_map(|m| &m.user_stories)
            .map(|s| s.features.len())
            .sum();
        HierarchyCounts {
            modules: self.modules.len(),
            user_stories,
            features,
        }
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.module_name.as_str()).collect()
    }

    /// Find a feature by name (case-insensitive), with its owning module and story.
    pub fn find_feature(&self, feature_name: &str) -> Option<(&Module, &UserStory, &Feature)> {
        self.modules.iter().find_map(|module| {
            module.user_stories.iter().find_map(|story| {
                story
                    .features
                    .iter()
                    .find(|f| same_name(&f.feature_name, feature_name))
                    .map(|feature| (module, story, feature))
            })
        })
    }

    /// Replace the node a fragment refers to.
    ///
    /// The node is located by `target_id` when given, otherwise by module name,
    /// story title, or feature name at the fragment's level. A replaced node
    /// keeps its id unless the fragment carries one of its own.
    pub fn splice(
        &mut self,
        fragment: EnhancementFragment,
        target_id: Option<Uuid>,
    ) -> SpliceOutcome {
        match fragment {
            EnhancementFragment::Module(mut updated) => {
                let target = self.modules.iter_mut().find(|m| {
                    matches_node(m.id, &m.module_name, target_id, &updated.module_name)
                });
                let Some(existing) = target else {
                    return SpliceOutcome::NotFound;
                };
                updated.id = updated.id.or(existing.id);
                let path = updated.module_name.clone();
                *existing = updated;
                SpliceOutcome::Replaced { path }
            }
            EnhancementFragment::UserStory(mut updated) => {
                for module in &mut self.modules {
                    let target = module
                        .user_stories
                        .iter_mut()
                        .find(|s| matches_node(s.id, &s.title, target_id, &updated.title));
                    if let Some(existing) = target {
                        updated.id = updated.id.or(existing.id);
                        let path = format!("{} / {}", module.module_name, updated.title);
                        *existing = updated;
                        return SpliceOutcome::Replaced { path };
                    }
                }
                SpliceOutcome::NotFound
            }
            EnhancementFragment::Feature(mut updated) => {
                for module in &mut self.modules {
                    for story in &mut module.user_stories {
                        let target = story.features.iter_mut().find(|f| {
                            matches_node(f.id, &f.feature_name, target_id, &updated.feature_name)
                        });
                        if let Some(existing) = target {
                            updated.id = updated.id.or(existing.id);
                            let path = format!(
                                "{} / {} / {}",
                                module.module_name, story.title, updated.feature_name
                            );
                            *existing = updated;
                            return SpliceOutcome::Replaced { path };
                        }
                    }
                }
                SpliceOutcome::NotFound
            }
        }
    }
}

fn matches_node(
    node_id: Option<Uuid>,
    node_name: &str,
    target_id: Option<Uuid>,
    fragment_name: &str,
) -> bool {
    match target_id {
        Some(target) => node_id == Some(target),
        None => same_name(node_name, fragment_name),
    }
}

fn same_name(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}
