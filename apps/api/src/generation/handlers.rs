//! Axum route handlers for the Generation and Jobs API.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::job::{
    BatchGenerationRequest, GenerationJob, GenerationRequest, GenerationResult, JobStatus,
};
use crate::state::AppState;
use crate::templates::TemplateMetadata;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<JobStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOutputResponse {
    pub job_id: Uuid,
    pub output_path: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/documents/generate
///
/// Runs one generation to completion. A failed generation still answers with
/// its result (and job id) but with 422.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<(StatusCode, Json<GenerationResult>), AppError> {
    if request.template_id.trim().is_empty() {
        return Err(AppError::Validation("templateId cannot be empty".to_string()));
    }

    let result = state.orchestrator.generate(request).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    Ok((status, Json(result)))
}

/// POST /api/v1/documents/batch
///
/// One result per data source, in input order.
pub async fn handle_batch(
    State(state): State<AppState>,
    Json(batch): Json<BatchGenerationRequest>,
) -> Result<Json<Vec<GenerationResult>>, AppError> {
    if batch.template_id.trim().is_empty() {
        return Err(AppError::Validation("templateId cannot be empty".to_string()));
    }
    if batch.data_sources.is_empty() {
        return Err(AppError::Validation("dataSources cannot be empty".to_string()));
    }

    Ok(Json(state.orchestrator.generate_batch(batch).await))
}

/// GET /api/v1/jobs?status=
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Vec<GenerationJob>>, AppError> {
    Ok(Json(state.orchestrator.list_jobs(query.status).await?))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<GenerationJob>, AppError> {
    state
        .orchestrator
        .get_job_status(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))
}

/// GET /api/v1/jobs/:id/output
///
/// 404 until the job has completed.
pub async fn handle_get_output(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobOutputResponse>, AppError> {
    let output_path = state
        .orchestrator
        .get_output_path(job_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No output for job {job_id}")))?;

    Ok(Json(JobOutputResponse {
        job_id,
        output_path,
    }))
}

/// GET /api/v1/templates
pub async fn handle_list_templates(State(state): State<AppState>) -> Json<Vec<TemplateMetadata>> {
    Json(state.orchestrator.templates().into_iter().cloned().collect())
}
