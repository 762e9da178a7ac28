//! HTTP data provider: fetches extracted document data from the document
//! store service (`GET {base_url}/documents/{id}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::models::dataset::SourceDataset;
use crate::providers::{DataProvider, DataQuery};

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct HttpDataProvider {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpDataProvider {
    pub const NAME: &'static str = "http";

    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn document_url(&self, document_id: &str) -> String {
        format!("{}/documents/{}", self.base_url, urlencoding::encode(document_id))
    }
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Retries on 429 and 5xx with exponential backoff (1s, 2s).
    async fn fetch_data(&self, query: &DataQuery) -> Result<SourceDataset, PipelineError> {
        let url = self.document_url(&query.document_id);
        let params: Vec<(String, String)> = query
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.as_str().map_or_else(|| v.to_string(), str::to_string)))
            .collect();

        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Fetch of '{}' attempt {} failed, retrying after {}ms...",
                    query.document_id,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.get(&url).query(&params);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(format!("HTTP error: {e}"));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Document service returned {status}: {body}");
                last_error = Some(format!("status {status}: {body}"));
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ServiceError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(PipelineError::DataProvider(format!(
                    "Document '{}' unavailable (status {}): {message}",
                    query.document_id,
                    status.as_u16()
                )));
            }

            let body = response
                .text()
                .await
                .map_err(|e| PipelineError::DataProvider(format!("HTTP error: {e}")))?;
            let dataset = parse_document(&body, &query.document_id)?;
            debug!(
                "Fetched '{}' ({} fields, {} items)",
                query.document_id,
                dataset.fields.len(),
                dataset.items.len()
            );
            return Ok(dataset);
        }

        Err(PipelineError::DataProvider(format!(
            "Document '{}' fetch failed after {MAX_RETRIES} attempts: {}",
            query.document_id,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }
}

fn parse_document(body: &str, document_id: &str) -> Result<SourceDataset, PipelineError> {
    let mut dataset: SourceDataset = serde_json::from_str(body).map_err(|e| {
        PipelineError::DataProvider(format!("Malformed response for '{document_id}': {e}"))
    })?;
    if dataset.source_id.is_empty() {
        dataset.source_id = document_id.to_string();
    }
    Ok(dataset)
}
