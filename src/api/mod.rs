mod handlers;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::Database;
use crate::pipeline::Pipeline;

/// Shared handler state.
///
/// The pipeline is optional so the store-only routes keep working when no
/// backend is configured; pipeline routes then answer 503 with the reason.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pipeline: Result<Pipeline, String>,
}

impl AppState {
    pub fn new(db: Database, pipeline: Pipeline) -> Self {
        Self {
            db,
            pipeline: Ok(pipeline),
        }
    }

    /// State for a server started without backend configuration.
    pub fn without_backend(db: Database, reason: impl Into<String>) -> Self {
        Self {
            db,
            pipeline: Err(reason.into()),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Projects
        .route("/projects", get(handlers::list_projects))
        .route("/projects", post(handlers::create_project))
        .route("/projects/import", post(handlers::import_document))
        .route("/projects/{id}", get(handlers::get_project))
        .route("/projects/{id}", put(handlers::update_project))
        .route("/projects/{id}", delete(handlers::delete_project))
        // Hierarchy
        .route("/projects/{id}/hierarchy", get(handlers::get_hierarchy))
        .route("/projects/{id}/hierarchy", put(handlers::replace_hierarchy))
        .route("/projects/{id}/enhance", post(handlers::enhance))
        .route("/projects/{id}/prompts", post(handlers::generate_prompt))
        // Business rules
        .route("/projects/{id}/business-rules", get(handlers::get_business_rules))
        .route("/projects/{id}/business-rules", put(handlers::save_business_rules))
        // Extraction without persistence
        .route("/extract", post(handlers::extract))
        // Health
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
