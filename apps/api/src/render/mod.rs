//! Renderers: turn mapped data plus a template into an output file.
//!
//! A renderer reports an expected failure (missing template body, bad output
//! name) as `RenderOutput { success: false, .. }`; `Err` is for I/O faults.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::models::dataset::Fields;
use crate::models::job::RenderOptions;
use crate::templates::TemplateMetadata;

pub mod json;
pub mod text;

pub use json::JsonRenderer;
pub use text::PlaceholderRenderer;

/// The data handed to a renderer: mapped fields plus named tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderData {
    pub fields: Fields,
    pub tables: BTreeMap<String, Vec<Fields>>,
}

impl RenderData {
    /// Tables as a single JSON object, for path lookups.
    pub fn tables_value(&self) -> Value {
        serde_json::to_value(&self.tables).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: Uuid,
    pub template: TemplateMetadata,
    pub data: RenderData,
    pub options: RenderOptions,
}

impl RenderRequest {
    /// `options.outputFormat` wins over the template's declared format.
    pub fn output_format(&self) -> &str {
        self.options
            .output_format
            .as_deref()
            .unwrap_or(&self.template.output_format)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOutput {
    pub success: bool,
    pub output_path: Option<String>,
    pub output_format: Option<String>,
    pub error_message: Option<String>,
}

impl RenderOutput {
    pub fn written(path: &Path, format: impl Into<String>) -> Self {
        Self {
            success: true,
            output_path: Some(path.display().to_string()),
            output_format: Some(format.into()),
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output_path: None,
            output_format: None,
            error_message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    fn name(&self) -> &str;

    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, PipelineError>;
}

/// Name → renderer map built at startup.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        info!("Registered renderer '{}'", renderer.name());
        self.renderers.insert(renderer.name().to_string(), renderer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Renderer>> {
        self.renderers.get(name).cloned()
    }
}

/// `<out_dir>/<outputName or job id>.<extension>`.
///
/// Returns `Err(message)` when the requested output name or extension would
/// escape the output directory. Extensions are plain ASCII alphanumerics.
pub(crate) fn output_path(
    out_dir: &Path,
    request: &RenderRequest,
    extension: &str,
) -> Result<PathBuf, String> {
    if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("Invalid output format '{extension}'"));
    }
    let stem = match request.options.output_name.as_deref() {
        Some(name)
            if name.is_empty() || name.contains(&['/', '\\'][..]) || name.contains("..") =>
        {
            return Err(format!("Invalid output name '{name}'"));
        }
        Some(name) => name.to_string(),
        None => request.job_id.to_string(),
    };
    Ok(out_dir.join(format!("{stem}.{extension}")))
}

pub(crate) async fn write_output(path: &Path, contents: &[u8]) -> Result<(), PipelineError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            PipelineError::Render(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| PipelineError::Render(format!("Cannot write {}: {e}", path.display())))
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_output_path_defaults_to_job_id() {
        let req = request(template("text", "t.txt".into()), RenderData::default());
        let path = output_path(Path::new("/out"), &req, "txt").unwrap();
        assert_eq!(path, PathBuf::from(format!("/out/{}.txt", req.job_id)));
    }

    #[test]
    fn test_output_name_cannot_escape() {
        let mut req = request(template("text", "t.txt".into()), RenderData::default());
        req.options.output_name = Some("../../etc/x".into());
        assert!(output_path(Path::new("/out"), &req, "txt").is_err());

        req.options.output_name = Some("offer-ada".into());
        assert_eq!(
            output_path(Path::new("/out"), &req, "txt").unwrap(),
            PathBuf::from("/out/offer-ada.txt")
        );
    }

    #[test]
    fn test_output_extension_cannot_escape() {
        let req = request(template("text", "t.txt".into()), RenderData::default());
        for bad in ["x/../../escaped", "..", "tar.gz", "", "md\\x"] {
            let err = output_path(Path::new("/out"), &req, bad).unwrap_err();
            assert!(err.contains("Invalid output format"), "{bad}: {err}");
        }
        assert!(output_path(Path::new("/out"), &req, "md").is_ok());
    }

    #[test]
    fn test_output_format_override() {
        let mut req = request(template("text", "t.txt".into()), RenderData::default());
        assert_eq!(req.output_format(), "txt");
        req.options.output_format = Some("md".into());
        assert_eq!(req.output_format(), "md");
    }
}
