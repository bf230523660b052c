use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use super::de;

/// A project owning one extracted hierarchy.
///
/// The overview is kept as a whole document; it is produced once per BRD and
/// only replaced through an explicit update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub application_type: ApplicationType,
    pub overview: Option<ProjectOverview>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
    /// Defaults to `Web Application` if not specified.
    #[serde(default)]
    pub application_type: Option<ApplicationType>,
    #[serde(default)]
    pub overview: Option<ProjectOverview>,
}

/// Input for updating an existing project. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub application_type: Option<ApplicationType>,
    pub overview: Option<ProjectOverview>,
}

/// First-stage extraction output: what the project is and why it exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOverview {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub project_name: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub project_description: String,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub business_intent: BusinessIntent,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub requirements: Requirements,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessIntent {
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub vision: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    pub purpose: String,
    #[serde(default, deserialize_with = "de::string_list")]
    pub objectives: Vec<String>,
    #[serde(default, deserialize_with = "de::null_as_default")]
    pub project_scope: ProjectScope,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectScope {
    #[serde(default, deserialize_with = "de::string_list")]
    pub in_scope: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub out_of_scope: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Requirements {
    #[serde(default, deserialize_with = "de::string_list")]
    pub functional: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub non_functional: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub integration: Vec<String>,
    #[serde(default, deserialize_with = "de::string_list")]
    pub reporting: Vec<String>,
}

/// The kind of software the document describes.
///
/// Drives the downstream generation prompts. Serialized with its display
/// name (`"Web Application"`), which is also what the backend is asked to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApplicationType {
    #[default]
    WebApplication,
    Website,
    MobileApplication,
    DesktopApplication,
    BatchApplication,
    Microservices,
    ApiService,
}

impl ApplicationType {
    pub const ALL: [ApplicationType; 7] = [
        Self::WebApplication,
        Self::Website,
        Self::MobileApplication,
        Self::DesktopApplication,
        Self::BatchApplication,
        Self::Microservices,
        Self::ApiService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WebApplication => "Web Application",
            Self::Website => "Website",
            Self::MobileApplication => "Mobile Application",
            Self::DesktopApplication => "Desktop Application",
            Self::BatchApplication => "Batch Application",
            Self::Microservices => "Microservices",
            Self::ApiService => "API Service",
        }
    }

    /// Match a display name, ignoring case, separators, and a trailing "app".
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "webapplication" | "webapp" => Some(Self::WebApplication),
            "website" => Some(Self::Website),
            "mobileapplication" | "mobileapp" => Some(Self::MobileApplication),
            "desktopapplication" | "desktopapp" => Some(Self::DesktopApplication),
            "batchapplication" | "batchapp" | "batch" => Some(Self::BatchApplication),
            "microservices" | "microservice" => Some(Self::Microservices),
            "apiservice" | "api" => Some(Self::ApiService),
            _ => None,
        }
    }

    /// Comma-separated list of display names, for prompts and error messages.
    pub fn choices() -> String {
        Self::ALL
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ApplicationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ApplicationType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Unknown names deserialize to the default rather than failing; the extraction
/// stage checks the raw value itself so it can warn about the substitution.
impl<'de> Deserialize<'de> for ApplicationType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => ApplicationType::from_str(&s).unwrap_or_default(),
            _ => ApplicationType::default(),
        })
    }
}
