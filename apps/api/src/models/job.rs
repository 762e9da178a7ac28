use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::models::dataset::MergeStrategy;

/// Lifecycle of a generation job: Pending → InProgress → {Completed | Failed}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Only forward moves along the single lifecycle path are allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
                | (JobStatus::InProgress, JobStatus::Failed)
        )
    }
}

/// Where the data for one document comes from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    /// Registered provider name; the orchestrator default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_strategy: Option<MergeStrategy>,
    /// Provider-specific query parameters, passed through untouched.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl DataSource {
    #[cfg(test)]
    pub fn document(id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            ..Default::default()
        }
    }

    #[cfg(test)]
    pub fn documents<I, S>(ids: I, strategy: MergeStrategy) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            document_ids: ids.into_iter().map(Into::into).collect(),
            merge_strategy: Some(strategy),
            ..Default::default()
        }
    }

    /// All requested document ids, single id first, without duplicates.
    pub fn all_document_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::with_capacity(self.document_ids.len() + 1);
        for id in self.document_id.iter().chain(self.document_ids.iter()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Renderer options forwarded with every render call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// Overrides the template's declared output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<String>,
    /// Base file name for the output; defaults to the job id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub template_id: String,
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    #[serde(default)]
    pub options: RenderOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGenerationRequest {
    pub template_id: String,
    pub data_sources: Vec<DataSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    #[serde(default)]
    pub options: RenderOptions,
}

impl BatchGenerationRequest {
    /// One single-document request per data source, in input order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.data_sources
            .iter()
            .map(|source| GenerationRequest {
                template_id: self.template_id.clone(),
                data_source: source.clone(),
                mapping_id: self.mapping_id.clone(),
                options: self.options.clone(),
            })
            .collect()
    }
}

/// Outcome of one generation, attached to its job once and then immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub success: bool,
    pub job_id: Uuid,
    pub output_path: Option<String>,
    pub output_format: Option<String>,
    pub error_message: Option<String>,
    /// Echo of the original request on failure.
    pub error_details: Option<Value>,
}

impl GenerationResult {
    pub fn succeeded(job_id: Uuid, output_path: String, output_format: String) -> Self {
        Self {
            success: true,
            job_id,
            output_path: Some(output_path),
            output_format: Some(output_format),
            error_message: None,
            error_details: None,
        }
    }

    pub fn failed(job_id: Uuid, message: impl Into<String>, request: &GenerationRequest) -> Self {
        Self {
            success: false,
            job_id,
            output_path: None,
            output_format: None,
            error_message: Some(message.into()),
            error_details: serde_json::to_value(request)
                .ok()
                .map(|request| serde_json::json!({ "request": request })),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub request: Value,
    pub result: Option<GenerationResult>,
    pub error: Option<String>,
}

impl GenerationJob {
    pub fn new(id: Uuid, request: &GenerationRequest) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            request: serde_json::to_value(request).unwrap_or(Value::Null),
            result: None,
            error: None,
        }
    }
}
