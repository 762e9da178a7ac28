use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::errors::PipelineError;
use crate::render::{output_path, write_output, RenderOutput, RenderRequest, Renderer};

/// Writes the render data itself as a JSON document. Ignores the template body.
pub struct JsonRenderer {
    out_dir: PathBuf,
}

impl JsonRenderer {
    pub const NAME: &'static str = "json";

    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

#[async_trait]
impl Renderer for JsonRenderer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, PipelineError> {
        let path = match output_path(&self.out_dir, request, "json") {
            Ok(path) => path,
            Err(message) => return Ok(RenderOutput::failed(message)),
        };

        let document = json!({
            "template": request.template.id,
            "generatedAt": Utc::now().to_rfc3339(),
            "fields": request.data.fields,
            "tables": request.data.tables,
        });
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| PipelineError::Render(format!("JSON encoding failed: {e}")))?;

        write_output(&path, &bytes).await?;
        debug!("Job {} rendered to {}", request.job_id, path.display());
        Ok(RenderOutput::written(&path, "json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::{request, template};
    use crate::render::RenderData;
    use serde_json::Value;

    #[tokio::test]
    async fn test_writes_fields_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = RenderData::default();
        data.fields.insert("name".into(), json!("Ada"));
        data.tables.insert(
            "lines".into(),
            vec![json!({"sku": "A"}).as_object().cloned().unwrap()],
        );
        let req = request(template("json", "unused".into()), data);

        let output = JsonRenderer::new(dir.path()).render(&req).await.unwrap();

        assert!(output.success);
        assert_eq!(output.output_format.as_deref(), Some("json"));
        let path = output.output_path.unwrap();
        assert!(path.ends_with(&format!("{}.json", req.job_id)));

        let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["template"], json!("letter"));
        assert_eq!(written["fields"]["name"], json!("Ada"));
        assert_eq!(written["tables"]["lines"][0]["sku"], json!("A"));
        assert!(written["generatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_creates_missing_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let req = request(template("json", "unused".into()), RenderData::default());

        let output = JsonRenderer::new(&nested).render(&req).await.unwrap();
        assert!(output.success);
        assert!(nested.is_dir());
    }
}
