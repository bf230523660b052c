use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::PipelineError;
use crate::models::*;
use crate::pipeline::{load_project_tree, Pipeline};

type ApiResult<T> = Result<T, (StatusCode, String)>;

// ============================================================
// Error Handling
// ============================================================

/// Log an internal error and return a sanitized response to the client.
///
/// Store validation failures ("... is required") are safe to show and come
/// back as BAD_REQUEST.
fn internal_error(e: impl std::fmt::Display) -> (StatusCode, String) {
    let msg = e.to_string();

    if msg.contains("is required") {
        tracing::warn!("Validation error: {}", msg);
        return (StatusCode::BAD_REQUEST, msg);
    }

    tracing::error!("Internal error: {}", msg);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

/// Map a stage error to a status. The message is already safe to expose:
/// raw completions are truncated in `Display`.
fn pipeline_error(e: PipelineError) -> (StatusCode, String) {
    let status = match &e {
        PipelineError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Backend { .. } => StatusCode::BAD_GATEWAY,
        PipelineError::MalformedOutput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
    };
    tracing::warn!(status = status.as_u16(), "Pipeline error: {}", e);
    (status, e.to_string())
}

fn not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "Project not found".to_string())
}

fn pipeline(state: &AppState) -> ApiResult<&Pipeline> {
    state.pipeline.as_ref().map_err(|reason| {
        pipeline_error(PipelineError::Configuration(reason.clone()))
    })
}

async fn stored_tree(state: &AppState, id: Uuid) -> ApiResult<ParsedBrd> {
    load_project_tree(&state.db, id)
        .await
        .map_err(internal_error)?
        .ok_or_else(not_found)
}

// ============================================================
// Request / Response Types
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ExtractInput {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportInput {
    pub text: String,
    /// Overrides the extracted project name.
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub project: Project,
    pub report: PersistenceReport,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceInput {
    #[serde(flatten)]
    pub request: EnhancementRequest,
    /// Splice the fragment into the stored tree and re-save it.
    #[serde(default)]
    pub apply: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceResponse {
    #[serde(flatten)]
    pub result: EnhancementResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub splice: Option<SpliceOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PersistenceReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInput {
    pub feature_name: String,
    /// Earlier generated prompts, oldest first.
    #[serde(default)]
    pub previous: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptResponse {
    pub feature_name: String,
    pub prompt: String,
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "backend": if state.pipeline.is_ok() { "configured" } else { "unconfigured" },
    }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    state.db.get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    state
        .db
        .get_project(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    state
        .db
        .create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> ApiResult<Json<Project>> {
    state
        .db
        .update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.db.delete_project(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found())
    }
}

// ============================================================
// Extraction
// ============================================================

pub async fn extract(
    State(state): State<AppState>,
    Json(input): Json<ExtractInput>,
) -> ApiResult<Json<ParsedBrd>> {
    pipeline(&state)?
        .extract_from_document(&input.text)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

/// Extract a document and save it as a new project.
///
/// Nothing is written unless both extraction stages succeed. Persistence
/// failures after that are per-node and reported, not raised.
pub async fn import_document(
    State(state): State<AppState>,
    Json(input): Json<ImportInput>,
) -> ApiResult<(StatusCode, Json<ImportResponse>)> {
    let tree = pipeline(&state)?
        .extract_from_document(&input.text)
        .await
        .map_err(pipeline_error)?;

    let (project, report) = state
        .db
        .create_project_from_tree(&tree, input.name)
        .map_err(internal_error)?;

    Ok((StatusCode::CREATED, Json(ImportResponse { project, report })))
}

// ============================================================
// Hierarchy
// ============================================================

pub async fn get_hierarchy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ParsedBrd>> {
    stored_tree(&state, id).await.map(Json)
}

pub async fn replace_hierarchy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(tree): Json<ParsedBrd>,
) -> ApiResult<Json<PersistenceReport>> {
    state
        .db
        .replace_project_tree(id, &tree)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(not_found)
}

pub async fn enhance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<EnhanceInput>,
) -> ApiResult<Json<EnhanceResponse>> {
    let pipeline = pipeline(&state)?;
    let mut tree = stored_tree(&state, id).await?;

    let result = pipeline
        .reconcile(&tree, &input.request)
        .await
        .map_err(pipeline_error)?;

    if !input.apply {
        return Ok(Json(EnhanceResponse {
            result,
            splice: None,
            report: None,
        }));
    }

    let fragment = result.fragment().map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!(
                "updated {} does not fit the hierarchy: {}",
                result.target_type.as_str(),
                e
            ),
        )
    })?;
    let splice = tree.splice(fragment, input.request.target_id);
    let report = match splice {
        SpliceOutcome::Replaced { .. } => state
            .db
            .replace_project_tree(id, &tree)
            .map_err(internal_error)?,
        SpliceOutcome::NotFound => None,
    };

    Ok(Json(EnhanceResponse {
        result,
        splice: Some(splice),
        report,
    }))
}

pub async fn generate_prompt(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<PromptInput>,
) -> ApiResult<Json<PromptResponse>> {
    let pipeline = pipeline(&state)?;
    let tree = stored_tree(&state, id).await?;

    let prompt = pipeline
        .generate_feature_prompt(&tree, &input.feature_name, &input.previous)
        .await
        .map_err(pipeline_error)?;

    Ok(Json(PromptResponse {
        feature_name: input.feature_name,
        prompt,
    }))
}

// ============================================================
// Business Rules
// ============================================================

pub async fn get_business_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<BusinessRulesConfig>> {
    if state.db.get_project(id).map_err(internal_error)?.is_none() {
        return Err(not_found());
    }
    let config = state.db.get_business_rules(id).map_err(internal_error)?;
    Ok(Json(config.unwrap_or_default()))
}

pub async fn save_business_rules(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(rules): Json<Vec<BusinessRule>>,
) -> ApiResult<Json<BusinessRulesConfig>> {
    if state.db.get_project(id).map_err(internal_error)?.is_none() {
        return Err(not_found());
    }
    state
        .db
        .save_business_rules(id, &rules)
        .map(Json)
        .map_err(internal_error)
}
