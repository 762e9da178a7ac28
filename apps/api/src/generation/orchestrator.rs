//! Generation orchestrator: drives one document through the pipeline.
//!
//! Flow: open job → resolve template → fetch (single or multi-source merge)
//!       → resolve mapping → map → render → close job.
//!
//! `generate` never returns an error: every failure is folded into a failed
//! `GenerationResult` and the job is closed as `Failed`.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::jobs::{JobStore, JobStoreError};
use crate::models::dataset::{Dataset, Fields, MergeStrategy, MergedDataset, SourceDataset};
use crate::models::job::{
    BatchGenerationRequest, DataSource, GenerationJob, GenerationRequest, GenerationResult,
    JobStatus,
};
use crate::models::mapping::MappingConfig;
use crate::pipeline::map_data;
use crate::providers::{DataQuery, ProviderRegistry};
use crate::render::{RenderData, RenderRequest, RendererRegistry};
use crate::templates::{MappingRegistry, TemplateMetadata, TemplateRegistry};

/// Table name under which raw line items are rendered when no mapping applies.
const RAW_ITEMS_TABLE: &str = "items";

// ────────────────────────────────────────────────────────────────────────────
// Settings
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Provider used when a data source does not name one.
    pub default_provider: String,
    pub fetch_timeout: Option<Duration>,
    pub render_timeout: Option<Duration>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_provider: "file".to_string(),
            fetch_timeout: None,
            render_timeout: None,
        }
    }
}

/// Data fetched for one job: a single document or a merge of several.
enum FetchedData {
    Single(SourceDataset),
    Merged(MergedDataset),
}

impl Dataset for FetchedData {
    fn fields(&self) -> &Fields {
        match self {
            FetchedData::Single(d) => &d.fields,
            FetchedData::Merged(d) => &d.fields,
        }
    }

    fn items(&self) -> &[Fields] {
        match self {
            FetchedData::Single(d) => &d.items,
            FetchedData::Merged(d) => &d.items,
        }
    }
}

pub struct Orchestrator {
    providers: ProviderRegistry,
    renderers: RendererRegistry,
    templates: TemplateRegistry,
    mappings: MappingRegistry,
    jobs: Arc<dyn JobStore>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        providers: ProviderRegistry,
        renderers: RendererRegistry,
        templates: TemplateRegistry,
        mappings: MappingRegistry,
        jobs: Arc<dyn JobStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            providers,
            renderers,
            templates,
            mappings,
            jobs,
            settings,
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Generation
    // ────────────────────────────────────────────────────────────────────────

    pub async fn generate(&self, request: GenerationRequest) -> GenerationResult {
        self.generate_job(Uuid::new_v4(), request).await
    }

    /// Runs every data source of the batch as its own task.
    ///
    /// Results come back in input order. A sub-job that fails or panics yields
    /// a failed result at its index and never affects its siblings.
    pub async fn generate_batch(self: &Arc<Self>, batch: BatchGenerationRequest) -> Vec<GenerationResult> {
        let requests = batch.requests();
        info!(
            "Batch for template '{}': {} data sources",
            batch.template_id,
            requests.len()
        );

        let mut handles = Vec::with_capacity(requests.len());
        for mut request in requests {
            // Allocated up front so a task that dies can still be closed.
            let job_id = Uuid::new_v4();
            // Siblings share the batch options; a shared name gets the job id.
            if let Some(name) = request.options.output_name.take() {
                request.options.output_name = Some(format!("{name}-{job_id}"));
            }
            let orchestrator = Arc::clone(self);
            let task_request = request.clone();
            let handle =
                tokio::spawn(async move { orchestrator.generate_job(job_id, task_request).await });
            handles.push((job_id, request, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (job_id, request, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    error!("Job {job_id}: generation task aborted: {e}");
                    self.fail_job(job_id, format!("Generation task aborted: {e}"), &request)
                        .await
                }
            };
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!("Batch complete: {succeeded}/{} succeeded", results.len());
        results
    }

    async fn generate_job(&self, job_id: Uuid, request: GenerationRequest) -> GenerationResult {
        if let Err(e) = self.open_job(job_id, &request).await {
            error!("Job {job_id}: could not be opened: {e}");
            return GenerationResult::failed(job_id, PipelineError::from(e).to_string(), &request);
        }
        info!("Job {job_id}: generating template '{}'", request.template_id);

        match self.run(job_id, &request).await {
            Ok((output_path, output_format)) => {
                let result = GenerationResult::succeeded(job_id, output_path, output_format);
                match self.jobs.complete(job_id, result.clone()).await {
                    Ok(()) => {
                        info!("Job {job_id}: completed");
                        result
                    }
                    Err(e) => {
                        error!("Job {job_id}: could not be completed: {e}");
                        self.fail_job(job_id, PipelineError::from(e).to_string(), &request)
                            .await
                    }
                }
            }
            Err(e) => {
                warn!("Job {job_id}: failed: {e}");
                self.fail_job(job_id, e.to_string(), &request).await
            }
        }
    }

    async fn open_job(&self, job_id: Uuid, request: &GenerationRequest) -> Result<(), JobStoreError> {
        self.jobs.create(GenerationJob::new(job_id, request)).await?;
        self.jobs.start(job_id).await
    }

    /// Closes the job as `Failed` from whatever non-terminal state it is in,
    /// creating the record if the job never got that far.
    async fn fail_job(
        &self,
        job_id: Uuid,
        message: String,
        request: &GenerationRequest,
    ) -> GenerationResult {
        let result = GenerationResult::failed(job_id, message.clone(), request);
        if let Err(e) = self.close_as_failed(job_id, message, result.clone(), request).await {
            error!("Job {job_id}: could not be marked failed: {e}");
        }
        result
    }

    async fn close_as_failed(
        &self,
        job_id: Uuid,
        message: String,
        result: GenerationResult,
        request: &GenerationRequest,
    ) -> Result<(), JobStoreError> {
        let status = match self.jobs.get(job_id).await? {
            Some(job) => job.status,
            None => {
                self.jobs.create(GenerationJob::new(job_id, request)).await?;
                JobStatus::Pending
            }
        };
        if status.is_terminal() {
            return Ok(());
        }
        if status == JobStatus::Pending {
            self.jobs.start(job_id).await?;
        }
        self.jobs.fail(job_id, message, result).await
    }

    /// Returns `(output_path, output_format)`.
    async fn run(
        &self,
        job_id: Uuid,
        request: &GenerationRequest,
    ) -> Result<(String, String), PipelineError> {
        let template = self
            .templates
            .get(&request.template_id)
            .cloned()
            .ok_or_else(|| PipelineError::TemplateNotFound(request.template_id.clone()))?;

        let data = self.fetch(&request.data_source).await?;
        info!(
            "Job {job_id}: fetched {} fields, {} items",
            data.fields().len(),
            data.items().len()
        );
        if let FetchedData::Merged(merged) = &data {
            for field in merged.fields.keys() {
                debug!(
                    "Job {job_id}: '{field}' from {} (score {:?})",
                    merged.source_of(field).unwrap_or("?"),
                    merged.score_of(field)
                );
            }
        }

        let mapping_id = request
            .mapping_id
            .as_deref()
            .or(template.mapping_id.as_deref())
            .unwrap_or(&template.id);
        let render_data = self.apply_mapping(job_id, mapping_id, &data);

        let renderer = self.renderers.get(&template.renderer).ok_or_else(|| {
            PipelineError::Configuration(format!(
                "No renderer '{}' for template '{}'",
                template.renderer, template.id
            ))
        })?;

        let render_request = RenderRequest {
            job_id,
            template,
            data: render_data,
            options: request.options.clone(),
        };
        let output = with_timeout(
            self.settings.render_timeout,
            "render",
            renderer.render(&render_request),
        )
        .await?;

        if !output.success {
            let message = output
                .error_message
                .unwrap_or_else(|| format!("Renderer '{}' reported failure", renderer.name()));
            return Err(PipelineError::Render(message));
        }
        let path = output.output_path.ok_or_else(|| {
            PipelineError::Render(format!("Renderer '{}' returned no output path", renderer.name()))
        })?;
        let format = output
            .output_format
            .unwrap_or_else(|| render_request.output_format().to_string());
        Ok((path, format))
    }

    async fn fetch(&self, source: &DataSource) -> Result<FetchedData, PipelineError> {
        let provider_name = source
            .provider
            .as_deref()
            .unwrap_or(&self.settings.default_provider);
        let provider = self.providers.get(provider_name).ok_or_else(|| {
            PipelineError::Configuration(format!("Unknown data provider '{provider_name}'"))
        })?;

        let ids = source.all_document_ids();
        match ids.as_slice() {
            [] => Err(PipelineError::Configuration(
                "Data source names no document".to_string(),
            )),
            [id] => {
                let query = DataQuery::new(id.clone()).with_params(source.params.clone());
                with_timeout(self.settings.fetch_timeout, "fetch", provider.fetch_data(&query))
                    .await
                    .map(FetchedData::Single)
            }
            _ => {
                // Timeouts apply per source so a slow one is dropped, not fatal.
                let strategy = source.merge_strategy.unwrap_or(MergeStrategy::Prioritized);
                provider
                    .fetch_multi_source_data(
                        &ids,
                        strategy,
                        &source.params,
                        self.settings.fetch_timeout,
                    )
                    .await
                    .map(FetchedData::Merged)
            }
        }
    }

    /// Maps the data, or falls back to rendering it raw when the mapping is
    /// missing or unusable.
    fn apply_mapping(&self, job_id: Uuid, mapping_id: &str, data: &FetchedData) -> RenderData {
        let config: MappingConfig = match self.mappings.resolve(mapping_id) {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                warn!("Job {job_id}: mapping '{mapping_id}' unusable ({e}); rendering raw data");
                return raw_render_data(data);
            }
            None => {
                warn!("Job {job_id}: no mapping '{mapping_id}'; rendering raw data");
                return raw_render_data(data);
            }
        };

        let mapped = map_data(data, &config);
        for warning in &mapped.warnings {
            warn!("Job {job_id}: mapping '{mapping_id}': {warning}");
        }
        for err in &mapped.errors {
            error!("Job {job_id}: mapping '{mapping_id}': {err}");
        }
        if !mapped.unmapped_fields.is_empty() {
            info!(
                "Job {job_id}: {} unmapped fields: {}",
                mapped.unmapped_fields.len(),
                mapped.unmapped_fields.join(", ")
            );
        }

        RenderData {
            fields: mapped.fields,
            tables: mapped.tables,
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Job queries
    // ────────────────────────────────────────────────────────────────────────

    pub async fn get_job_status(&self, job_id: Uuid) -> Result<Option<GenerationJob>, JobStoreError> {
        self.jobs.get(job_id).await
    }

    /// Output location of a job, only once it has completed.
    pub async fn get_output_path(&self, job_id: Uuid) -> Result<Option<String>, JobStoreError> {
        Ok(self
            .jobs
            .get(job_id)
            .await?
            .filter(|job| job.status == JobStatus::Completed)
            .and_then(|job| job.result)
            .and_then(|result| result.output_path))
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<GenerationJob>, JobStoreError> {
        self.jobs.list(status).await
    }

    pub fn templates(&self) -> Vec<&TemplateMetadata> {
        self.templates.list()
    }
}

fn raw_render_data(data: &FetchedData) -> RenderData {
    let mut tables = BTreeMap::new();
    if !data.items().is_empty() {
        tables.insert(RAW_ITEMS_TABLE.to_string(), data.items().to_vec());
    }
    RenderData {
        fields: data.fields().clone(),
        tables,
    }
}

async fn with_timeout<T, F>(
    limit: Option<Duration>,
    stage: &'static str,
    future: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, future)
            .await
            .map_err(|_| PipelineError::Timeout { stage, limit })?,
        None => future.await,
    }
}
