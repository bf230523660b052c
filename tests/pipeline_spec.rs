use std::sync::Arc;

use blueprint::db::Database;
use blueprint::llm::{BackendConfig, ScriptedBackend, ScriptedReply, Stage};
use blueprint::models::*;
use blueprint::pipeline::{load_project_tree, Pipeline};
use blueprint::PipelineError;
use serde_json::json;

const DOCUMENT: &str = "We need a task tracker with login and a dashboard. \
Users sign in with email and password. After signing in they see a dashboard \
listing their open tasks. Passwords must be at least 12 characters.";

fn overview_reply() -> String {
    json!({
        "projectOverview": {
            "projectName": "Task Tracker",
            "projectDescription": "A small team task tracker",
            "businessIntent": {
                "vision": "Nobody loses track of work",
                "objectives": ["Track open tasks"],
                "projectScope": { "inScope": ["Login", "Dashboard"], "outOfScope": ["Billing"] }
            },
            "requirements": { "functional": ["Login", "Task dashboard"] }
        },
        "applicationType": "Web Application"
    })
    .to_string()
}

fn detail_reply() -> String {
    let body = json!({
        "modules": [
            {
                "moduleName": "Authentication",
                "moduleDescription": "Email and password sign in",
                "priority": "High",
                "userStories": [{
                    "title": "As a user, I want to log in so that I can see my tasks",
                    "userRole": "user",
                    "acceptanceCriteria": ["Valid credentials log in", "Invalid ones are rejected"],
                    "priority": "High",
                    "features": [
                        { "featureName": "Login form", "taskDescription": "Email and password form", "estimatedHours": 6 },
                        { "featureName": "Session handling", "taskDescription": "Keep users signed in", "priority": "Medium" }
                    ]
                }]
            },
            {
                "moduleName": "Dashboard",
                "moduleDescription": "Open tasks at a glance",
                "priority": "Medium",
                "dependencies": ["Authentication"],
                "userStories": [{
                    "title": "As a user, I want to see my open tasks",
                    "features": [
                        { "featureName": "Task list", "taskDescription": "List open tasks", "priority": "Low" }
                    ]
                }]
            }
        ],
        "businessRules": [
            { "ruleName": "Password policy", "ruleDescription": "Passwords need at least 12 characters" },
            { "ruleName": "Uptime", "ruleDescription": "99.5% availability", "applicableTo": "all" }
        ],
        "techStackSuggestions": { "frontend": ["React"], "backend": ["Rust"] }
    });
    format!("```json\n{}\n```", serde_json::to_string_pretty(&body).unwrap())
}

fn scripted() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_reply(Stage::Overview, overview_reply())
        .with_reply(Stage::Detail, detail_reply())
}

fn database() -> Database {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    db
}

mod extraction {
    use super::*;

    #[tokio::test]
    async fn extracts_a_task_tracker() {
        let backend = Arc::new(scripted());
        let pipeline = Pipeline::new(backend.clone());

        let tree = pipeline.extract_from_document(DOCUMENT).await.unwrap();

        assert!(tree.project_overview.project_name.contains("Task"));
        assert_eq!(tree.application_type, ApplicationType::WebApplication);
        assert!(tree
            .module_names()
            .iter()
            .any(|name| name.contains("Authentication") || name.contains("Login")));
        assert_eq!(tree.counts().features, 3);
        assert_eq!(
            tree.tech_stack_suggestions,
            Some(json!({ "frontend": ["React"], "backend": ["Rust"] }))
        );
    }

    #[tokio::test]
    async fn calls_the_stages_in_order_with_the_overview_as_context() {
        let backend = Arc::new(scripted());
        let pipeline = Pipeline::new(backend.clone());

        pipeline.extract_from_document(DOCUMENT).await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].stage, Stage::Overview);
        assert_eq!(requests[1].stage, Stage::Detail);
        assert!(requests[1].messages[1].content.contains("A small team task tracker"));
        assert!(requests.iter().all(|r| r.json_response));
    }

    #[tokio::test]
    async fn infers_rule_applicability() {
        let pipeline = Pipeline::new(Arc::new(scripted()));

        let tree = pipeline.extract_from_document(DOCUMENT).await.unwrap();

        assert_eq!(tree.business_rules[0].applicable_to, vec!["Authentication"]);
        assert_eq!(tree.business_rules[1].applicable_to, vec!["all"]);
    }

    #[tokio::test]
    async fn defaults_an_unknown_application_type() {
        let overview = overview_reply().replace("Web Application", "Hologram");
        let backend = ScriptedBackend::new()
            .with_reply(Stage::Overview, overview)
            .with_reply(Stage::Detail, detail_reply());

        let tree = Pipeline::new(Arc::new(backend))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap();

        assert_eq!(tree.application_type, ApplicationType::WebApplication);
    }

    #[tokio::test]
    async fn empty_detail_arrays_are_not_an_error() {
        let backend = ScriptedBackend::new()
            .with_reply(Stage::Overview, overview_reply())
            .with_reply(Stage::Detail, "{\"modules\": null}");

        let tree = Pipeline::new(Arc::new(backend))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap();

        assert!(tree.modules.is_empty());
        assert!(tree.business_rules.is_empty());
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn prose_output_is_malformed_and_nothing_is_written() {
        let db = database();
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_reply(Stage::Overview, "Sure! Here's the JSON: {\"projectOverview\": {"),
        );
        let pipeline = Pipeline::new(backend.clone());

        let err = pipeline.extract_from_document(DOCUMENT).await.unwrap_err();

        match &err {
            PipelineError::MalformedOutput { stage, raw, .. } => {
                assert_eq!(*stage, Stage::Overview);
                assert!(raw.starts_with("Sure!"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(backend.calls(Stage::Detail), 0);
        assert!(db.get_all_projects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_is_a_backend_error_for_its_stage() {
        let backend = ScriptedBackend::new()
            .with_reply(Stage::Overview, overview_reply())
            .with(Stage::Detail, ScriptedReply::Timeout);

        let err = Pipeline::new(Arc::new(backend))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Backend {
                stage: Stage::Detail,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_completion_is_a_backend_error() {
        let backend = ScriptedBackend::new().with(Stage::Overview, ScriptedReply::Empty);

        let err = Pipeline::new(Arc::new(backend))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Backend {
                stage: Stage::Overview,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn empty_document_is_rejected_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new());
        let pipeline = Pipeline::new(backend.clone());

        let err = pipeline.extract_from_document("   ").await.unwrap_err();

        assert!(matches!(err, PipelineError::InvalidInput(_)));
        assert!(backend.requests().is_empty());
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let err = BackendConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}

mod persistence {
    use super::*;

    #[tokio::test]
    async fn clean_two_module_tree_persists_without_failures() {
        let db = database();
        let tree = Pipeline::new(Arc::new(scripted()))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap();

        let (project, report) = db.create_project_from_tree(&tree, None).unwrap();

        assert_eq!(report.failures().count(), 0);
        let outcomes = report.module_outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes
            .iter()
            .all(|(_, outcome)| matches!(outcome, ModuleOutcome::Created(_))));

        let stored = load_project_tree(&db, project.id).await.unwrap().unwrap();
        assert_eq!(stored.counts(), tree.counts());
        assert_eq!(stored.business_rules, tree.business_rules);
    }
}

mod enhancement {
    use super::*;

    async fn stored_project(db: &Database) -> (uuid::Uuid, ParsedBrd) {
        let tree = Pipeline::new(Arc::new(scripted()))
            .extract_from_document(DOCUMENT)
            .await
            .unwrap();
        let (project, _) = db.create_project_from_tree(&tree, None).unwrap();
        let stored = load_project_tree(db, project.id).await.unwrap().unwrap();
        (project.id, stored)
    }

    #[tokio::test]
    async fn reconciles_and_splices_a_feature() {
        let db = database();
        let (project_id, mut tree) = stored_project(&db).await;
        let feature_id = tree.modules[0].user_stories[0].features[0].id;

        let reply = json!({
            "kind": "feature",
            "message": "Added a remember-me checkbox",
            "updatedObject": {
                "featureName": "Login form",
                "taskDescription": "Email and password form with remember-me",
                "priority": "High",
                "estimatedHours": 8
            }
        });
        let backend = Arc::new(
            ScriptedBackend::new().with_reply(Stage::Enhancement, reply.to_string()),
        );
        let pipeline = Pipeline::new(backend.clone());

        let request = EnhancementRequest {
            enhancement_request: "Add remember-me to the login form".to_string(),
            target_type: None,
            target_id: None,
        };
        let result = pipeline.reconcile(&tree, &request).await.unwrap();

        assert_eq!(result.target_type, TargetType::Feature);
        assert_eq!(result.classified_by, ClassificationSource::Discriminator);
        assert!(backend.requests()[0].messages[1]
            .content
            .contains("Add remember-me to the login form"));

        let outcome = tree.splice(result.fragment().unwrap(), None);
        assert!(matches!(outcome, SpliceOutcome::Replaced { .. }));
        let report = db.replace_project_tree(project_id, &tree).unwrap().unwrap();
        assert!(report.is_clean());

        let reloaded = load_project_tree(&db, project_id).await.unwrap().unwrap();
        let feature = &reloaded.modules[0].user_stories[0].features[0];
        assert_eq!(feature.id, feature_id);
        assert!(feature.task_description.contains("remember-me"));
        assert_eq!(feature.estimated_hours, Some(8.0));
    }

    #[tokio::test]
    async fn shapeless_fragment_falls_back_to_feature() {
        let backend = ScriptedBackend::new().with_reply(Stage::Enhancement, "{}");
        let request = EnhancementRequest {
            enhancement_request: "Make it better".to_string(),
            target_type: None,
            target_id: None,
        };

        let result = Pipeline::new(Arc::new(backend))
            .reconcile(&ParsedBrd::default(), &request)
            .await
            .unwrap();

        assert_eq!(result.target_type, TargetType::Feature);
        assert_eq!(result.classified_by, ClassificationSource::Fallback);
    }

    #[tokio::test]
    async fn generates_a_feature_prompt_from_the_stored_tree() {
        let db = database();
        let (_, tree) = stored_project(&db).await;
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_reply(Stage::ImplementationPrompt, "Build the task list view."),
        );

        let prompt = Pipeline::new(backend.clone())
            .generate_feature_prompt(&tree, "Task list", &[])
            .await
            .unwrap();

        assert_eq!(prompt, "Build the task list view.");
        let request = &backend.requests()[0];
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert!(request.messages[1].content.contains("Dashboard"));
    }
}
