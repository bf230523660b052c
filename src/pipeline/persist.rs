//! Cascading save of an extracted tree into the relational store.
//!
//! The save is a saga rather than one transaction. Every module, story, and
//! feature insert is an independent step; a failed step skips its descendants
//! and the save moves on to the next sibling. The outcome of every step lands
//! in a [`PersistenceReport`], which [`HierarchyPersister::compensate`] can
//! walk backwards to undo what was written.

use anyhow::Result;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    BusinessRule, BusinessRulesConfig, Feature, Module, ParsedBrd, PersistenceReport, StepKind,
    StepResult, UserStory,
};

/// The writes the persister needs from a store.
///
/// Each call is its own unit of work: the persister never asks a store to
/// hold a transaction open across calls.
pub trait HierarchyStore: Send + Sync {
    /// Remove every module, story, and feature of the project.
    fn clear_hierarchy(&self, project_id: Uuid) -> Result<()>;

    fn insert_module(&self, project_id: Uuid, position: usize, module: &Module) -> Result<Uuid>;

    fn insert_user_story(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        position: usize,
        story: &UserStory,
    ) -> Result<Uuid>;

    fn insert_feature(
        &self,
        project_id: Uuid,
        module_id: Uuid,
        story_id: Uuid,
        position: usize,
        feature: &Feature,
    ) -> Result<Uuid>;

    /// Replace the project's business rules, returning the stored (versioned) config.
    fn save_business_rules(
        &self,
        project_id: Uuid,
        rules: &[BusinessRule],
    ) -> Result<BusinessRulesConfig>;

    fn save_tech_stack(&self, project_id: Uuid, config: &Value) -> Result<()>;

    fn save_uiux_guidelines(&self, project_id: Uuid, config: &Value) -> Result<()>;

    fn delete_module(&self, id: Uuid) -> Result<bool>;

    fn delete_user_story(&self, id: Uuid) -> Result<bool>;

    fn delete_feature(&self, id: Uuid) -> Result<bool>;
}

/// Writes a [`ParsedBrd`] through a [`HierarchyStore`].
pub struct HierarchyPersister<'a, S: HierarchyStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: HierarchyStore + ?Sized> HierarchyPersister<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Replace the project's stored hierarchy and configs with `tree`.
    ///
    /// Never returns an error: every failure is a step in the report.
    pub fn persist(&self, project_id: Uuid, tree: &ParsedBrd) -> PersistenceReport {
        let mut report = PersistenceReport::new(project_id);

        if let Err(e) = self.store.clear_hierarchy(project_id) {
            tracing::error!(%project_id, error = %e, "Failed to clear existing hierarchy");
            report.record(
                StepKind::ClearHierarchy,
                "",
                StepResult::Failed {
                    reason: e.to_string(),
                },
            );
            for (i, module) in tree.modules.iter().enumerate() {
                report.record(
                    StepKind::Module,
                    node_label(&module.module_name, "module", i),
                    StepResult::Skipped {
                        reason: "existing hierarchy could not be cleared".to_string(),
                    },
                );
            }
        } else {
            report.record(
                StepKind::ClearHierarchy,
                "",
                StepResult::Created { id: project_id },
            );
            for (i, module) in tree.modules.iter().enumerate() {
                self.persist_module(&mut report, project_id, i, module);
            }
        }

        self.persist_configs(&mut report, project_id, tree);

        let failures = report.failures().count();
        if failures == 0 {
            tracing::info!(
                %project_id,
                steps = report.steps.len(),
                "Persisted hierarchy"
            );
        } else {
            tracing::warn!(
                %project_id,
                steps = report.steps.len(),
                failures,
                "Persisted hierarchy with failures"
            );
        }
        report
    }

    /// Undo every row `report` created, newest first.
    ///
    /// Config upserts are left alone: there is no earlier value to restore.
    /// Returns how many rows were deleted.
    pub fn compensate(&self, report: &PersistenceReport) -> usize {
        let mut deleted = 0;
        for step in report.steps.iter().rev() {
            let StepResult::Created { id } = step.result else {
                continue;
            };
            let outcome = match step.kind {
                StepKind::Feature => self.store.delete_feature(id),
                StepKind::UserStory => self.store.delete_user_story(id),
                StepKind::Module => self.store.delete_module(id),
                _ => continue,
            };
            match outcome {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(path = %step.path, error = %e, "Failed to compensate step")
                }
            }
        }
        tracing::info!(project_id = %report.project_id, deleted, "Compensated persistence");
        deleted
    }

    fn persist_module(
        &self,
        report: &mut PersistenceReport,
        project_id: Uuid,
        position: usize,
        module: &Module,
    ) {
        let path = node_label(&module.module_name, "module", position);
        let module_id = match self.store.insert_module(project_id, position, module) {
            Ok(id) => {
                report.record(StepKind::Module, &path, StepResult::Created { id });
                id
            }
            Err(e) => {
                tracing::warn!(%path, error = %e, "Module insert failed, skipping its stories");
                report.record(
                    StepKind::Module,
                    &path,
                    StepResult::Failed {
                        reason: e.to_string(),
                    },
                );
                for (j, story) in module.user_stories.iter().enumerate() {
                    report.record(
                        StepKind::UserStory,
                        format!("{} / {}", path, node_label(&story.title, "story", j)),
                        StepResult::Skipped {
                            reason: "parent module failed".to_string(),
                        },
                    );
                }
                return;
            }
        };

        for (j, story) in module.user_stories.iter().enumerate() {
            let story_path = format!("{} / {}", path, node_label(&story.title, "story", j));
            match self
                .store
                .insert_user_story(project_id, module_id, j, story)
            {
                Ok(story_id) => {
                    report.record(
                        StepKind::UserStory,
                        &story_path,
                        StepResult::Created { id: story_id },
                    );
                    for (k, feature) in story.features.iter().enumerate() {
                        let feature_path = format!(
                            "{} / {}",
                            story_path,
                            node_label(&feature.feature_name, "feature", k)
                        );
                        let result = match self
                            .store
                            .insert_feature(project_id, module_id, story_id, k, feature)
                        {
                            Ok(id) => StepResult::Created { id },
                            Err(e) => {
                                tracing::warn!(path = %feature_path, error = %e, "Feature insert failed");
                                StepResult::Failed {
                                    reason: e.to_string(),
                                }
                            }
                        };
                        report.record(StepKind::Feature, feature_path, result);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %story_path, error = %e, "Story insert failed, skipping its features");
                    report.record(
                        StepKind::UserStory,
                        &story_path,
                        StepResult::Failed {
                            reason: e.to_string(),
                        },
                    );
                    for (k, feature) in story.features.iter().enumerate() {
                        report.record(
                            StepKind::Feature,
                            format!(
                                "{} / {}",
                                story_path,
                                node_label(&feature.feature_name, "feature", k)
                            ),
                            StepResult::Skipped {
                                reason: "parent user story failed".to_string(),
                            },
                        );
                    }
                }
            }
        }
    }

    fn persist_configs(&self, report: &mut PersistenceReport, project_id: Uuid, tree: &ParsedBrd) {
        let result = match self.store.save_business_rules(project_id, &tree.business_rules) {
            Ok(config) => {
                tracing::debug!(
                    %project_id,
                    version = config.version,
                    rules = config.categories.len(),
                    "Saved business rules"
                );
                StepResult::Created { id: project_id }
            }
            Err(e) => StepResult::Failed {
                reason: e.to_string(),
            },
        };
        report.record(StepKind::BusinessRules, "businessRules", result);

        if let Some(config) = &tree.tech_stack_suggestions {
            let result = upsert_result(project_id, self.store.save_tech_stack(project_id, config));
            report.record(StepKind::TechStack, "techStackSuggestions", result);
        }
        if let Some(config) = &tree.ui_ux_guidelines {
            let result =
                upsert_result(project_id, self.store.save_uiux_guidelines(project_id, config));
            report.record(StepKind::UiUxGuidelines, "uiUxGuidelines", result);
        }
    }
}

/// Persist `tree` under `project_id` with a one-off persister.
pub fn persist_hierarchy<S: HierarchyStore + ?Sized>(
    store: &S,
    project_id: Uuid,
    tree: &ParsedBrd,
) -> PersistenceReport {
    HierarchyPersister::new(store).persist(project_id, tree)
}

fn upsert_result(project_id: Uuid, outcome: Result<()>) -> StepResult {
    match outcome {
        Ok(()) => StepResult::Created { id: project_id },
        Err(e) => StepResult::Failed {
            reason: e.to_string(),
        },
    }
}

/// The node's name, or `kind[i]` when it has none.
fn node_label(name: &str, kind: &str, position: usize) -> String {
    let name = name.trim();
    if name.is_empty() {
        format!("{}[{}]", kind, position)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records writes in memory; fails inserts for names listed in `reject`.
    #[derive(Default)]
    struct RecordingStore {
        reject: Vec<&'static str>,
        fail_clear: bool,
        rows: Mutex<Vec<(StepKind, Uuid)>>,
        deleted: Mutex<Vec<Uuid>>,
    }

    impl RecordingStore {
        fn insert(&self, kind: StepKind, name: &str) -> Result<Uuid> {
            anyhow::ensure!(!self.reject.contains(&name), "rejected {}", name);
            let id = Uuid::new_v4();
            self.rows.lock().unwrap().push((kind, id));
            Ok(id)
        }
    }

    impl HierarchyStore for RecordingStore {
        fn clear_hierarchy(&self, _project_id: Uuid) -> Result<()> {
            anyhow::ensure!(!self.fail_clear, "disk full");
            Ok(())
        }

        fn insert_module(&self, _: Uuid, _: usize, module: &Module) -> Result<Uuid> {
            self.insert(StepKind::Module, &module.module_name)
        }

        fn insert_user_story(&self, _: Uuid, _: Uuid, _: usize, story: &UserStory) -> Result<Uuid> {
            self.insert(StepKind::UserStory, &story.title)
        }

        fn insert_feature(
            &self,
            _: Uuid,
            _: Uuid,
            _: Uuid,
            _: usize,
            feature: &Feature,
        ) -> Result<Uuid> {
            self.insert(StepKind::Feature, &feature.feature_name)
        }

        fn save_business_rules(
            &self,
            _: Uuid,
            rules: &[BusinessRule],
        ) -> Result<BusinessRulesConfig> {
            Ok(BusinessRulesConfig::from_rules(1, rules))
        }

        fn save_tech_stack(&self, _: Uuid, _: &Value) -> Result<()> {
            Ok(())
        }

        fn save_uiux_guidelines(&self, _: Uuid, _: &Value) -> Result<()> {
            anyhow::bail!("uiux table missing")
        }

        fn delete_module(&self, id: Uuid) -> Result<bool> {
            self.deleted.lock().unwrap().push(id);
            Ok(true)
        }

        fn delete_user_story(&self, id: Uuid) -> Result<bool> {
            self.deleted.lock().unwrap().push(id);
            Ok(true)
        }

        fn delete_feature(&self, id: Uuid) -> Result<bool> {
            self.deleted.lock().unwrap().push(id);
            Ok(true)
        }
    }

    fn tree() -> ParsedBrd {
        let feature = |name: &str| Feature {
            feature_name: name.to_string(),
            task_description: "do it".to_string(),
            ..Default::default()
        };
        let story = |title: &str, features: Vec<Feature>| UserStory {
            title: title.to_string(),
            features,
            ..Default::default()
        };
        ParsedBrd {
            modules: vec![
                Module {
                    module_name: "Authentication".to_string(),
                    user_stories: vec![story("Log in", vec![feature("Login form"), feature("Reset")])],
                    ..Default::default()
                },
                Module {
                    module_name: "Dashboard".to_string(),
                    user_stories: vec![story("See tasks", vec![feature("Task list")])],
                    ..Default::default()
                },
            ],
            tech_stack_suggestions: Some(serde_json::json!({ "backend": ["Rust"] })),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_tree_has_no_failures() {
        let store = RecordingStore::default();
        let report = persist_hierarchy(&store, Uuid::new_v4(), &tree());

        assert_eq!(report.created(StepKind::Module), 2);
        assert_eq!(report.created(StepKind::UserStory), 2);
        assert_eq!(report.created(StepKind::Feature), 3);
        assert_eq!(report.created(StepKind::TechStack), 1);
        assert_eq!(report.failures().count(), 0);
        assert!(report.is_clean());
    }

    #[test]
    fn test_failed_module_skips_descendants_and_continues() {
        let store = RecordingStore {
            reject: vec!["Authentication"],
            ..Default::default()
        };
        let report = persist_hierarchy(&store, Uuid::new_v4(), &tree());

        assert_eq!(report.failed(StepKind::Module), 1);
        assert_eq!(report.created(StepKind::Module), 1);
        assert_eq!(report.skipped(StepKind::UserStory), 1);
        assert_eq!(report.created(StepKind::Feature), 1);

        let outcomes = report.module_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].0, "Authentication");
    }

    #[test]
    fn test_failed_story_skips_its_features() {
        let store = RecordingStore {
            reject: vec!["Log in"],
            ..Default::default()
        };
        let report = persist_hierarchy(&store, Uuid::new_v4(), &tree());

        assert_eq!(report.failed(StepKind::UserStory), 1);
        assert_eq!(report.skipped(StepKind::Feature), 2);
        assert_eq!(report.created(StepKind::Feature), 1);
    }

    #[test]
    fn test_failed_feature_does_not_stop_siblings() {
        let store = RecordingStore {
            reject: vec!["Login form"],
            ..Default::default()
        };
        let report = persist_hierarchy(&store, Uuid::new_v4(), &tree());

        assert_eq!(report.failed(StepKind::Feature), 1);
        assert_eq!(report.created(StepKind::Feature), 2);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.path, "Authentication / Log in / Login form");
    }

    #[test]
    fn test_clear_failure_skips_every_module() {
        let store = RecordingStore {
            fail_clear: true,
            ..Default::default()
        };
        let report = persist_hierarchy(&store, Uuid::new_v4(), &tree());

        assert_eq!(report.failed(StepKind::ClearHierarchy), 1);
        assert_eq!(report.skipped(StepKind::Module), 2);
        assert!(store.rows.lock().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_failure_is_recorded() {
        let mut brd = tree();
        brd.ui_ux_guidelines = Some(serde_json::json!({ "tone": "calm" }));
        let store = RecordingStore::default();
        let report = persist_hierarchy(&store, Uuid::new_v4(), &brd);

        assert_eq!(report.failed(StepKind::UiUxGuidelines), 1);
        assert_eq!(report.created(StepKind::BusinessRules), 1);
    }

    #[test]
    fn test_unnamed_nodes_get_positional_paths() {
        let mut brd = tree();
        brd.modules[1].module_name = "  ".to_string();
        let store = RecordingStore {
            reject: vec!["  "],
            ..Default::default()
        };
        let report = persist_hierarchy(&store, Uuid::new_v4(), &brd);
        let failure = report.failures().next().unwrap();
        assert_eq!(failure.path, "module[1]");
    }

    #[test]
    fn test_compensate_deletes_newest_first() {
        let store = RecordingStore::default();
        let persister = HierarchyPersister::new(&store);
        let report = persister.persist(Uuid::new_v4(), &tree());

        let deleted = persister.compensate(&report);
        assert_eq!(deleted, 7);

        let created: Vec<Uuid> = store.rows.lock().unwrap().iter().map(|(_, id)| *id).collect();
        let mut expected = created.clone();
        expected.reverse();
        assert_eq!(*store.deleted.lock().unwrap(), expected);
    }
}
