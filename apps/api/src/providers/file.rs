use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PipelineError;
use crate::models::dataset::SourceDataset;
use crate::providers::{DataProvider, DataQuery};

/// Reads extracted document data from `<root>/<document_id>.json`.
///
/// The file holds `{fields, items?, sourceId?}`; a missing `sourceId` is
/// filled with the document id.
pub struct FileDataProvider {
    root: PathBuf,
}

impl FileDataProvider {
    pub const NAME: &'static str = "file";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, document_id: &str) -> Result<PathBuf, PipelineError> {
        let is_plain = !document_id.is_empty()
            && !document_id.contains(&['/', '\\'][..])
            && !document_id.contains("..");
        if !is_plain {
            return Err(PipelineError::DataProvider(format!(
                "Invalid document id '{document_id}'"
            )));
        }
        Ok(self.root.join(format!("{document_id}.json")))
    }
}

#[async_trait]
impl DataProvider for FileDataProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn fetch_data(&self, query: &DataQuery) -> Result<SourceDataset, PipelineError> {
        let path = self.document_path(&query.document_id)?;
        debug!("Reading document data from {}", path.display());

        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::DataProvider(format!("Cannot read {}: {e}", path.display()))
        })?;

        let mut dataset: SourceDataset = serde_json::from_str(&text).map_err(|e| {
            PipelineError::DataProvider(format!("Malformed document {}: {e}", path.display()))
        })?;

        if dataset.source_id.is_empty() {
            dataset.source_id = query.document_id.clone();
        }
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reads_document_and_defaults_source_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("inv-1.json"),
            json!({"fields": {"total": 10}, "items": [{"sku": "A"}]}).to_string(),
        )
        .unwrap();

        let provider = FileDataProvider::new(dir.path());
        let dataset = provider.fetch_data(&DataQuery::new("inv-1")).await.unwrap();

        assert_eq!(dataset.source_id, "inv-1");
        assert_eq!(dataset.fields["total"], json!(10));
        assert_eq!(dataset.items.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_source_id_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("c.json"),
            json!({"fields": {}, "sourceId": "contract-v2"}).to_string(),
        )
        .unwrap();

        let provider = FileDataProvider::new(dir.path());
        let dataset = provider.fetch_data(&DataQuery::new("c")).await.unwrap();
        assert_eq!(dataset.source_id, "contract-v2");
    }

    #[tokio::test]
    async fn test_missing_and_malformed_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let provider = FileDataProvider::new(dir.path());

        assert!(matches!(
            provider.fetch_data(&DataQuery::new("absent")).await,
            Err(PipelineError::DataProvider(_))
        ));
        assert!(matches!(
            provider.fetch_data(&DataQuery::new("bad")).await,
            Err(PipelineError::DataProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let provider = FileDataProvider::new("/tmp");
        for id in ["../etc/passwd", "a/b", "", "..", "a\\b"] {
            assert!(
                provider.fetch_data(&DataQuery::new(id)).await.is_err(),
                "id {id:?} should be rejected"
            );
        }
    }
}
