use blueprint::db::Database;
use blueprint::models::*;
use blueprint::pipeline::{load_project_tree, HierarchyPersister};
use serde_json::json;
use speculate2::speculate;
use uuid::Uuid;

fn create_test_project(db: &Database) -> Project {
    db.create_project(CreateProjectInput {
        name: "Test Project".to_string(),
        description: None,
        application_type: None,
        overview: None,
    })
    .expect("Failed to create project")
}

fn feature(name: &str, priority: Priority) -> Feature {
    Feature {
        feature_name: name.to_string(),
        task_description: format!("Implement {}", name),
        priority,
        estimated_hours: Some(4.5),
        business_rules: Some("Must be audited".to_string()),
        ..Default::default()
    }
}

fn sample_tree() -> ParsedBrd {
    ParsedBrd {
        project_overview: ProjectOverview {
            project_name: "Task Tracker".to_string(),
            project_description: "Track tasks across a team".to_string(),
            ..Default::default()
        },
        application_type: ApplicationType::WebApplication,
        modules: vec![
            Module {
                module_name: "Authentication".to_string(),
                module_description: "Sign in and out".to_string(),
                priority: Priority::High,
                business_impact: Some("Gatekeeps everything".to_string()),
                dependencies: vec![],
                user_stories: vec![UserStory {
                    title: "As a user I want to log in".to_string(),
                    user_role: "user".to_string(),
                    description: "Email and password".to_string(),
                    acceptance_criteria: vec!["Valid credentials work".to_string()],
                    priority: Priority::High,
                    features: vec![
                        feature("Login form", Priority::High),
                        feature("Remember me", Priority::Low),
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            },
            Module {
                module_name: "Dashboard".to_string(),
                module_description: "Open tasks at a glance".to_string(),
                priority: Priority::Medium,
                dependencies: vec!["Authentication".to_string()],
                user_stories: vec![UserStory {
                    title: "As a user I want to see my tasks".to_string(),
                    features: vec![feature("Task list", Priority::Medium)],
                    ..Default::default()
                }],
                ..Default::default()
            },
        ],
        business_rules: vec![BusinessRule {
            rule_name: "Password policy".to_string(),
            rule_description: "At least 12 characters".to_string(),
            applicable_to: vec!["Authentication".to_string()],
        }],
        tech_stack_suggestions: Some(json!({ "backend": ["Rust"] })),
        ui_ux_guidelines: None,
    }
}

fn strip_ids(tree: &mut ParsedBrd) {
    for module in &mut tree.modules {
        module.id = None;
        for story in &mut module.user_stories {
            story.id = None;
            for feature in &mut story.features {
                feature.id = None;
            }
        }
    }
}

fn load_tree(db: &Database, project_id: Uuid) -> ParsedBrd {
    tokio_test::block_on(load_project_tree(db, project_id))
        .expect("Failed to load tree")
        .expect("Project missing")
}

speculate! {
    before {
        let db = Database::open_memory().expect("Failed to create in-memory database");
        db.migrate().expect("Failed to run migrations");
    }

    describe "projects" {
        describe "create_project" {
            it "creates a project with required fields" {
                let project = create_test_project(&db);

                assert_eq!(project.name, "Test Project");
                assert!(project.description.is_none());
                assert_eq!(project.application_type, ApplicationType::WebApplication);
            }

            it "stores the overview and application type" {
                let project = db.create_project(CreateProjectInput {
                    name: "Shop".to_string(),
                    description: Some("An online shop".to_string()),
                    application_type: Some(ApplicationType::Microservices),
                    overview: Some(sample_tree().project_overview),
                }).expect("Failed to create project");

                let found = db.get_project(project.id).expect("Query failed").expect("Not found");
                assert_eq!(found.application_type, ApplicationType::Microservices);
                assert_eq!(found.overview.unwrap().project_name, "Task Tracker");
            }

            it "rejects a blank name" {
                let result = db.create_project(CreateProjectInput {
                    name: "  ".to_string(),
                    description: None,
                    application_type: None,
                    overview: None,
                });
                assert!(result.is_err());
            }
        }

        describe "get_project" {
            it "returns None for non-existent project" {
                let result = db.get_project(Uuid::new_v4()).expect("Query failed");
                assert!(result.is_none());
            }
        }

        describe "get_all_projects" {
            it "returns all projects ordered by name" {
                for name in ["Zebra", "Alpha"] {
                    db.create_project(CreateProjectInput {
                        name: name.to_string(),
                        description: None,
                        application_type: None,
                        overview: None,
                    }).expect("Failed to create");
                }

                let projects = db.get_all_projects().expect("Query failed");
                let names: Vec<&str> = projects.iter().map(|p| p.name.as_str()).collect();
                assert_eq!(names, vec!["Alpha", "Zebra"]);
            }
        }

        describe "update_project" {
            it "updates only the given fields" {
                let project = create_test_project(&db);

                let updated = db.update_project(project.id, UpdateProjectInput {
                    application_type: Some(ApplicationType::ApiService),
                    ..Default::default()
                }).expect("Update failed").expect("Not found");

                assert_eq!(updated.name, "Test Project");
                assert_eq!(updated.application_type, ApplicationType::ApiService);
            }

            it "returns None for non-existent project" {
                let result = db.update_project(Uuid::new_v4(), UpdateProjectInput::default())
                    .expect("Update failed");
                assert!(result.is_none());
            }
        }

        describe "delete_project" {
            it "cascades to the hierarchy and configs" {
                let (project, _) = db.create_project_from_tree(&sample_tree(), None)
                    .expect("Import failed");

                assert!(db.delete_project(project.id).expect("Delete failed"));

                assert!(db.load_modules(project.id).expect("Query failed").is_empty());
                assert!(db.get_business_rules(project.id).expect("Query failed").is_none());
                assert!(db.get_tech_stack(project.id).expect("Query failed").is_none());
            }

            it "returns false for non-existent project" {
                assert!(!db.delete_project(Uuid::new_v4()).expect("Delete failed"));
            }
        }
    }

    describe "hierarchy" {
        describe "persisting a tree" {
            it "reports zero failures for a clean tree" {
                let (project, report) = db.create_project_from_tree(&sample_tree(), None)
                    .expect("Import failed");

                assert_eq!(project.name, "Task Tracker");
                assert_eq!(report.failures().count(), 0);
                assert!(report.is_clean());
                assert_eq!(report.created(StepKind::Module), 2);
                assert_eq!(report.created(StepKind::UserStory), 2);
                assert_eq!(report.created(StepKind::Feature), 3);
            }

            it "persists N-1 modules when one module has no name" {
                let mut tree = sample_tree();
                tree.modules.insert(1, Module {
                    module_name: String::new(),
                    user_stories: vec![UserStory {
                        title: "Orphan".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                });

                let (project, report) = db.create_project_from_tree(&tree, None)
                    .expect("Import failed");

                assert_eq!(report.created(StepKind::Module), 2);
                assert_eq!(report.failed(StepKind::Module), 1);
                assert_eq!(report.failures().count(), 1);
                assert_eq!(report.skipped(StepKind::UserStory), 1);

                let outcomes = report.module_outcomes();
                assert_eq!(outcomes[1].0, "module[1]");
                assert!(matches!(outcomes[1].1, ModuleOutcome::Failed(_)));
                assert_eq!(db.load_modules(project.id).expect("Query failed").len(), 2);
            }

            it "replaces the previous hierarchy on re-save" {
                let (project, _) = db.create_project_from_tree(&sample_tree(), None)
                    .expect("Import failed");

                let mut tree = load_tree(&db, project.id);
                tree.modules.truncate(1);
                let report = db.replace_project_tree(project.id, &tree)
                    .expect("Save failed")
                    .expect("Project missing");

                assert!(report.is_clean());
                let modules = db.load_modules(project.id).expect("Query failed");
                assert_eq!(modules.len(), 1);
                assert_eq!(modules[0].id, tree.modules[0].id);
            }

            it "copies a stored tree into another project with fresh ids" {
                let (source, _) = db.create_project_from_tree(&sample_tree(), None)
                    .expect("Import failed");
                let target = create_test_project(&db);
                let exported = load_tree(&db, source.id);

                let report = db.replace_project_tree(target.id, &exported)
                    .expect("Save failed")
                    .expect("Project missing");

                assert!(report.is_clean());
                assert_eq!(report.created(StepKind::Feature), 3);
                let copied = load_tree(&db, target.id);
                assert_eq!(copied.module_names(), exported.module_names());
                assert_ne!(copied.modules[0].id, exported.modules[0].id);
                assert_ne!(
                    copied.modules[0].user_stories[0].features[0].id,
                    exported.modules[0].user_stories[0].features[0].id
                );
                assert_eq!(load_tree(&db, source.id), exported);
            }

            it "compensation removes every created row" {
                let project = create_test_project(&db);
                let persister = HierarchyPersister::new(&db);
                let report = persister.persist(project.id, &sample_tree());

                let deleted = persister.compensate(&report);

                assert!(deleted >= 2);
                assert!(db.load_modules(project.id).expect("Query failed").is_empty());
            }
        }

        describe "reading a tree back" {
            it "is isomorphic to the persisted tree" {
                let original = sample_tree();
                let (project, _) = db.create_project_from_tree(&original, None)
                    .expect("Import failed");

                let mut loaded = load_tree(&db, project.id);
                assert!(loaded.modules.iter().all(|m| m.id.is_some()));
                strip_ids(&mut loaded);

                assert_eq!(loaded, original);
            }

            it "orders nodes by position, not insertion order" {
                let project = create_test_project(&db);
                for (position, name) in [(2, "Reports"), (0, "Auth"), (1, "Tasks")] {
                    db.insert_module(project.id, position, &Module {
                        module_name: name.to_string(),
                        ..Default::default()
                    }).expect("Insert failed");
                }

                let tree = load_tree(&db, project.id);
                assert_eq!(tree.module_names(), vec!["Auth", "Tasks", "Reports"]);
            }

            it "returns None for a missing project" {
                let result = tokio_test::block_on(load_project_tree(&db, Uuid::new_v4()))
                    .expect("Query failed");
                assert!(result.is_none());
            }
        }

        describe "referential integrity" {
            it "rejects a story under an unknown module" {
                let project = create_test_project(&db);
                let result = db.insert_user_story(
                    project.id,
                    Uuid::new_v4(),
                    0,
                    &UserStory { title: "Lost".to_string(), ..Default::default() },
                );
                assert!(result.is_err());
            }

            it "deleting a module removes its stories and features" {
                let (project, _) = db.create_project_from_tree(&sample_tree(), None)
                    .expect("Import failed");
                let modules = db.load_modules(project.id).expect("Query failed");
                let module_id = modules[0].id.expect("module id");
                let story_id = db.load_user_stories(module_id).expect("Query failed")[0]
                    .id
                    .expect("story id");

                assert!(db.delete_module(module_id).expect("Delete failed"));

                assert!(db.load_user_stories(module_id).expect("Query failed").is_empty());
                assert!(db.load_features(story_id).expect("Query failed").is_empty());
            }
        }
    }

    describe "configs" {
        describe "business rules" {
            it "bumps the version on every save" {
                let project = create_test_project(&db);
                let rules = sample_tree().business_rules;

                let first = db.save_business_rules(project.id, &rules).expect("Save failed");
                let second = db.save_business_rules(project.id, &[]).expect("Save failed");

                assert_eq!(first.version, 1);
                assert_eq!(first.categories[0].id, "BR-001");
                assert_eq!(second.version, 2);

                let stored = db.get_business_rules(project.id)
                    .expect("Query failed")
                    .expect("Missing config");
                assert_eq!(stored.version, 2);
                assert!(stored.categories.is_empty());
            }
        }

        describe "blobs" {
            it "upserts tech stack and ui/ux guidelines" {
                let project = create_test_project(&db);

                db.save_tech_stack(project.id, &json!({ "backend": ["Go"] })).expect("Save failed");
                db.save_tech_stack(project.id, &json!({ "backend": ["Rust"] })).expect("Save failed");
                db.save_uiux_guidelines(project.id, &json!({ "tone": "calm" })).expect("Save failed");

                let stack = db.get_tech_stack(project.id).expect("Query failed").expect("Missing");
                assert_eq!(stack.config, json!({ "backend": ["Rust"] }));
                assert_eq!(stack.project_id, project.id);
                assert!(db.get_uiux_guidelines(project.id).expect("Query failed").is_some());
            }
        }
    }

    describe "file-backed database" {
        it "persists across reopen" {
            let dir = tempfile::tempdir().expect("tempdir");
            let path = dir.path().join("nested").join("blueprint.db");

            let project_id = {
                let file_db = Database::open(path.clone()).expect("Open failed");
                file_db.migrate().expect("Migrate failed");
                create_test_project(&file_db).id
            };

            let reopened = Database::open(path).expect("Reopen failed");
            reopened.migrate().expect("Migrate failed");
            assert!(reopened.get_project(project_id).expect("Query failed").is_some());
        }
    }
}
