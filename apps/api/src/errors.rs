use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::jobs::JobStoreError;

/// Pipeline-level error taxonomy.
///
/// Merge and mapping diagnostics are accumulated into their result types and
/// never surface here; these variants are the job-terminating failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Merge requires at least one dataset")]
    EmptyInput,

    #[error("Data provider error: {0}")]
    DataProvider(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Timed out after {}ms during {stage}", .limit.as_millis())]
    Timeout { stage: &'static str, limit: Duration },

    #[error("Job store error: {0}")]
    JobStore(String),
}

impl From<JobStoreError> for PipelineError {
    fn from(e: JobStoreError) -> Self {
        PipelineError::JobStore(e.to_string())
    }
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Job store error: {0}")]
    JobStore(#[from] JobStoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::JobStore(e) => {
                tracing::error!("Job store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "JOB_STORE_ERROR",
                    "A job storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
