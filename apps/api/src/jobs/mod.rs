//! Job storage: the only shared mutable state in the pipeline.
//!
//! `JobStore` is the seam for persistence backends; `InMemoryJobStore` is the
//! default. Every implementation must enforce the single lifecycle path
//! Pending → InProgress → {Completed | Failed}.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::job::{GenerationJob, GenerationResult, JobStatus};

pub mod memory;

pub use memory::InMemoryJobStore;

#[derive(Debug, Error)]
pub enum JobStoreError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("Job {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Job {id}: invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job store lock poisoned")]
    Poisoned,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Inserts a new `Pending` job.
    async fn create(&self, job: GenerationJob) -> Result<(), JobStoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, JobStoreError>;

    /// Pending → InProgress.
    async fn start(&self, id: Uuid) -> Result<(), JobStoreError>;

    /// InProgress → Completed, attaching the result.
    async fn complete(&self, id: Uuid, result: GenerationResult) -> Result<(), JobStoreError>;

    /// InProgress → Failed, attaching the message and (failed) result.
    async fn fail(
        &self,
        id: Uuid,
        message: String,
        result: GenerationResult,
    ) -> Result<(), JobStoreError>;

    /// All jobs, optionally filtered by status, oldest first.
    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, JobStoreError>;
}
