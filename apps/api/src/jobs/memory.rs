use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::jobs::{JobStore, JobStoreError};
use crate::models::job::{GenerationJob, GenerationResult, JobStatus};

/// In-process job store. The lock is never held across an `.await`.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: RwLock<HashMap<Uuid, GenerationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition(
        &self,
        id: Uuid,
        to: JobStatus,
        apply: impl FnOnce(&mut GenerationJob),
    ) -> Result<(), JobStoreError> {
        let mut jobs = self.inner.write().map_err(|_| JobStoreError::Poisoned)?;
        let job = jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;

        if !job.status.can_transition_to(to) {
            return Err(JobStoreError::InvalidTransition {
                id,
                from: job.status,
                to,
            });
        }

        job.status = to;
        apply(job);
        debug!("Job {id} -> {to:?}");
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: GenerationJob) -> Result<(), JobStoreError> {
        let mut jobs = self.inner.write().map_err(|_| JobStoreError::Poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<GenerationJob>, JobStoreError> {
        let jobs = self.inner.read().map_err(|_| JobStoreError::Poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn start(&self, id: Uuid) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::InProgress, |job| {
            job.started_at = Some(Utc::now());
        })
    }

    async fn complete(&self, id: Uuid, result: GenerationResult) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::Completed, |job| {
            job.completed_at = Some(Utc::now());
            job.result = Some(result);
        })
    }

    async fn fail(
        &self,
        id: Uuid,
        message: String,
        result: GenerationResult,
    ) -> Result<(), JobStoreError> {
        self.transition(id, JobStatus::Failed, |job| {
            job.completed_at = Some(Utc::now());
            job.error = Some(message);
            job.result = Some(result);
        })
    }

    async fn list(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, JobStoreError> {
        let jobs = self.inner.read().map_err(|_| JobStoreError::Poisoned)?;
        let mut matching: Vec<GenerationJob> = jobs
            .values()
            .filter(|job| status.map_or(true, |s| job.status == s))
            .cloned()
            .collect();
        matching.sort_by_key(|job| job.created_at);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::GenerationRequest;
    use std::sync::Arc;

    fn new_job() -> GenerationJob {
        GenerationJob::new(Uuid::new_v4(), &GenerationRequest::default())
    }

    #[tokio::test]
    async fn test_full_lifecycle_to_completed() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id;

        store.create(job).await.unwrap();
        assert_eq!(store.get(id).await.unwrap().unwrap().status, JobStatus::Pending);

        store.start(id).await.unwrap();
        let started = store.get(id).await.unwrap().unwrap();
        assert_eq!(started.status, JobStatus::InProgress);
        assert!(started.started_at.is_some());

        let result = GenerationResult::succeeded(id, "/out/x.txt".into(), "txt".into());
        store.complete(id, result.clone()).await.unwrap();
        let done = store.get(id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.result, Some(result));
        assert!(done.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_states_are_absorbing() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id;
        store.create(job).await.unwrap();
        store.start(id).await.unwrap();

        let failed = GenerationResult::failed(id, "boom", &GenerationRequest::default());
        store.fail(id, "boom".into(), failed.clone()).await.unwrap();

        assert!(matches!(
            store.start(id).await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            store
                .complete(id, GenerationResult::succeeded(id, "p".into(), "txt".into()))
                .await,
            Err(JobStoreError::InvalidTransition { .. })
        ));

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_cannot_skip_in_progress() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        let id = job.id;
        store.create(job).await.unwrap();

        let result = GenerationResult::succeeded(id, "p".into(), "txt".into());
        assert!(matches!(
            store.complete(id, result).await,
            Err(JobStoreError::InvalidTransition {
                from: JobStatus::Pending,
                to: JobStatus::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_ids() {
        let store = InMemoryJobStore::new();
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
        assert!(matches!(
            store.start(Uuid::new_v4()).await,
            Err(JobStoreError::NotFound(_))
        ));

        let job = new_job();
        store.create(job.clone()).await.unwrap();
        assert!(matches!(
            store.create(job).await,
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = InMemoryJobStore::new();
        let a = new_job();
        let b = new_job();
        let a_id = a.id;
        store.create(a).await.unwrap();
        store.create(b).await.unwrap();
        store.start(a_id).await.unwrap();

        assert_eq!(store.list(None).await.unwrap().len(), 2);
        let running = store.list(Some(JobStatus::InProgress)).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, a_id);
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_interfere() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let job = new_job();
                let id = job.id;
                store.create(job).await.unwrap();
                store.start(id).await.unwrap();
                store
                    .complete(id, GenerationResult::succeeded(id, "p".into(), "txt".into()))
                    .await
                    .unwrap();
                id
            }));
        }

        for handle in handles {
            let id = handle.await.unwrap();
            let job = store.get(id).await.unwrap().unwrap();
            assert_eq!(job.status, JobStatus::Completed);
        }
        assert_eq!(store.list(Some(JobStatus::Completed)).await.unwrap().len(), 32);
    }
}
