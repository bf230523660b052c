use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{Feature, Module, UserStory};

/// The hierarchy level an enhancement fragment represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TargetType {
    Module,
    UserStory,
    Feature,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::UserStory => "userStory",
            Self::Feature => "feature",
        }
    }

    /// Parse a level name; accepts `userStory`, `user_story`, `user story` and `story`.
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "module" => Some(Self::Module),
            "userstory" | "story" => Some(Self::UserStory),
            "feature" => Some(Self::Feature),
            _ => None,
        }
    }
}

/// What decided a fragment's [`TargetType`].
///
/// - `Discriminator`: the backend emitted a valid `kind` field
/// - `Shape`: the fragment's fields matched one of the structural rules
/// - `Hint`: nothing matched and the caller's hint was used
/// - `Fallback`: nothing matched and there was no hint; defaulted to `Feature`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Discriminator,
    Shape,
    Hint,
    Fallback,
}

/// A natural-language change request against an existing hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementRequest {
    pub enhancement_request: String,
    #[serde(default)]
    pub target_type: Option<TargetType>,
    #[serde(default)]
    pub target_id: Option<Uuid>,
}

/// Reconciler output: the updated fragment, tagged after the fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResult {
    pub updated_object: Value,
    pub target_type: TargetType,
    pub classified_by: ClassificationSource,
    pub message: String,
}

impl EnhancementResult {
    /// Deserialize the fragment into the typed node for its target type.
    pub fn fragment(&self) -> Result<EnhancementFragment, serde_json::Error> {
        EnhancementFragment::from_value(self.target_type, self.updated_object.clone())
    }
}

/// A typed enhancement fragment, ready to splice into a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum EnhancementFragment {
    Module(Module),
    UserStory(UserStory),
    Feature(Feature),
}

impl EnhancementFragment {
    pub fn from_value(target_type: TargetType, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match target_type {
            TargetType::Module => Self::Module(serde_json::from_value(value)?),
            TargetType::UserStory => Self::UserStory(serde_json::from_value(value)?),
            TargetType::Feature => Self::Feature(serde_json::from_value(value)?),
        })
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Self::Module(_) => TargetType::Module,
            Self::UserStory(_) => TargetType::UserStory,
            Self::Feature(_) => TargetType::Feature,
        }
    }
}
