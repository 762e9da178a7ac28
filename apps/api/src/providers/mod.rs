//! Data providers: the boundary where extracted document data enters the
//! pipeline.
//!
//! Providers are registered by name once at startup into a `ProviderRegistry`
//! that the orchestrator owns; there is no global registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::models::dataset::{MergeStrategy, MergedDataset, SourceDataset};
use crate::pipeline::merge;

pub mod file;
pub mod http;

pub use file::FileDataProvider;
pub use http::HttpDataProvider;

/// Identifies one source document plus provider-specific parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataQuery {
    pub document_id: String,
    pub params: Map<String, Value>,
}

impl DataQuery {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            params: Map::new(),
        }
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetches a single source dataset.
    async fn fetch_data(&self, query: &DataQuery) -> Result<SourceDataset, PipelineError>;

    /// Fetches every id concurrently and merges the survivors in input order.
    ///
    /// Each fetch gets its own `timeout`. A failed or timed-out source is
    /// logged and dropped; the call fails only when every source failed.
    /// Providers that override this must keep the same merge semantics.
    async fn fetch_multi_source_data(
        &self,
        document_ids: &[String],
        strategy: MergeStrategy,
        params: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> Result<MergedDataset, PipelineError> {
        let queries: Vec<DataQuery> = document_ids
            .iter()
            .map(|id| DataQuery::new(id.clone()).with_params(params.clone()))
            .collect();
        let outcomes = join_all(queries.iter().map(|query| async move {
            let fetch = self.fetch_data(query);
            match timeout {
                Some(limit) => tokio::time::timeout(limit, fetch)
                    .await
                    .unwrap_or(Err(PipelineError::Timeout { stage: "fetch", limit })),
                None => fetch.await,
            }
        }))
        .await;

        let mut datasets = Vec::with_capacity(document_ids.len());
        let mut failures = Vec::new();
        for (id, outcome) in document_ids.iter().zip(outcomes) {
            match outcome {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => {
                    warn!("Provider '{}': dropping source '{id}': {e}", self.name());
                    failures.push(format!("{id}: {e}"));
                }
            }
        }

        if datasets.is_empty() {
            return Err(PipelineError::DataProvider(format!(
                "All {} sources failed to fetch ({})",
                document_ids.len(),
                failures.join("; ")
            )));
        }

        info!(
            "Provider '{}': merging {}/{} sources with {:?}",
            self.name(),
            datasets.len(),
            document_ids.len(),
            strategy
        );
        merge(&datasets, strategy)
    }
}

/// Name → provider map built at startup.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn DataProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn DataProvider>) {
        info!("Registered data provider '{}'", provider.name());
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}
