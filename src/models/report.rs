use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kind of write a persistence step performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    ClearHierarchy,
    Module,
    UserStory,
    Feature,
    BusinessRules,
    TechStack,
    UiUxGuidelines,
}

/// Result of one persistence step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepResult {
    /// A row was written. `id` is the row's identity (the project id for upserts).
    Created { id: Uuid },
    /// The write failed; descendants were not attempted.
    Failed { reason: String },
    /// Not attempted because a parent failed.
    Skipped { reason: String },
}

/// One entry in the persistence log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistenceStep {
    pub kind: StepKind,
    /// Path of the node, e.g. `"Auth / Sign in / Login form"`.
    pub path: String,
    #[serde(flatten)]
    pub result: StepResult,
}

/// Per-item log of a cascading save.
///
/// A save never aborts on a single bad row: every module, story, and feature
/// is attempted independently and its outcome recorded here, so callers can
/// tell the user which nodes were and were not saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistenceReport {
    pub project_id: Uuid,
    pub steps: Vec<PersistenceStep>,
}

/// Per-module summary: row id on success, reason on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModuleOutcome {
    Created(Uuid),
    Failed(String),
}

impl PersistenceReport {
    pub fn new(project_id: Uuid) -> Self {
        Self {
            project_id,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: StepKind, path: impl Into<String>, result: StepResult) {
        self.steps.push(PersistenceStep {
            kind,
            path: path.into(),
            result,
        });
    }

    pub fn created(&self, kind: StepKind) -> usize {
        self.count(kind, |r| matches!(r, StepResult::Created { .. }))
    }

    pub fn failed(&self, kind: StepKind) -> usize {
        self.count(kind, |r| matches!(r, StepResult::Failed { .. }))
    }

    pub fn skipped(&self, kind: StepKind) -> usize {
        self.count(kind, |r| matches!(r, StepResult::Skipped { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &PersistenceStep> {
        self.steps
            .iter()
            .filter(|s| matches!(s.result, StepResult::Failed { .. }))
    }

    /// True when no step failed or was skipped.
    pub fn is_clean(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.result, StepResult::Created { .. }))
    }

    /// Module name → created row id or failure reason, in document order.
    pub fn module_outcomes(&self) -> Vec<(String, ModuleOutcome)> {
        self.steps
            .iter()
            .filter(|s| s.kind == StepKind::Module)
            .filter_map(|s| match &s.result {
                StepResult::Created { id } => Some((s.path.clone(), ModuleOutcome::Created(*id))),
                StepResult::Failed { reason } => {
                    Some((s.path.clone(), ModuleOutcome::Failed(reason.clone())))
                }
                StepResult::Skipped { .. } => None,
            })
            .collect()
    }

    fn count(&self, kind: StepKind, pred: impl Fn(&StepResult) -> bool) -> usize {
        self.steps
            .iter()
            .filter(|s| s.kind == kind && pred(&s.result))
            .count()
    }
}
