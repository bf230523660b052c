use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::de;

/// Marker in [`BusinessRule::applicable_to`] meaning "every module".
pub const APPLIES_TO_ALL: &str = "all";

/// A project-wide rule extracted from the document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", from = "BusinessRuleRecord")]
pub struct BusinessRule {
    pub rule_name: String,
    pub rule_description: String,
    /// Module names the rule applies to, or [`APPLIES_TO_ALL`].
    pub applicable_to: Vec<String>,
}

/// `name` and `description` only stand in when the canonical keys are blank.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BusinessRuleRecord {
    #[serde(default, deserialize_with = "de::lenient_string")]
    rule_name: String,
    #[serde(default, rename = "name", deserialize_with = "de::lenient_string")]
    alt_name: String,
    #[serde(default, deserialize_with = "de::lenient_string")]
    rule_description: String,
    #[serde(default, rename = "description", deserialize_with = "de::lenient_string")]
    alt_description: String,
    #[serde(default, deserialize_with = "de::string_list")]
    applicable_to: Vec<String>,
}

impl From<BusinessRuleRecord> for BusinessRule {
    fn from(r: BusinessRuleRecord) -> Self {
        BusinessRule {
            rule_name: de::prefer(r.rule_name, r.alt_name),
            rule_description: de::prefer(r.rule_description, r.alt_description),
            applicable_to: r.applicable_to,
        }
    }
}

impl BusinessRule {
    pub fn applies_to_all(&self) -> bool {
        self.applicable_to.is_empty()
            || self.applicable_to.iter().any(|m| {
                let m = m.trim();
                m.eq_ignore_ascii_case(APPLIES_TO_ALL) || m.eq_ignore_ascii_case("all modules")
            })
    }

    pub fn applies_to(&self, module_name: &str) -> bool {
        self.applies_to_all()
            || self
                .applicable_to
                .iter()
                .any(|m| m.trim().eq_ignore_ascii_case(module_name.trim()))
    }
}

/// The stored form of a project's business rules: one versioned blob.
///
/// Rules are read and applied as a single configuration object, so saving
/// replaces the whole set and bumps `version`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessRulesConfig {
    pub version: u32,
    pub categories: Vec<RuleCategory>,
}

/// One rule as it appears inside a [`BusinessRulesConfig`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCategory {
    /// Stable display id, `BR-001` onwards in document order.
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub applicable_to: Vec<String>,
}

impl BusinessRulesConfig {
    pub fn from_rules(version: u32, rules: &[BusinessRule]) -> Self {
        let categories = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| RuleCategory {
                id: format!("BR-{:03}", i + 1),
                name: rule.rule_name.clone(),
                description: rule.rule_description.clone(),
                applicable_to: rule.applicable_to.clone(),
            })
            .collect();
        Self {
            version,
            categories,
        }
    }

    pub fn rules(&self) -> Vec<BusinessRule> {
        self.categories
            .iter()
            .map(|c| BusinessRule {
                rule_name: c.name.clone(),
                rule_description: c.description.clone(),
                applicable_to: c.applicable_to.clone(),
            })
            .collect()
    }
}

/// A free-form config blob (tech stack or UI/UX guidelines) attached 1:1 to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfigBlob {
    pub project_id: Uuid,
    pub config: Value,
    pub updated_at: DateTime<Utc>,
}
