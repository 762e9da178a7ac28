use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::pipeline::path::{lookup, lookup_in};
use crate::pipeline::transforms::stringify;
use crate::render::{output_path, write_output, RenderData, RenderOutput, RenderRequest, Renderer};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").expect("valid regex"));

/// Substitutes `{{ path }}` placeholders in a plain-text template.
///
/// Paths are looked up in the mapped fields first, then in the tables
/// (`{{ lines.0.sku }}`). Unknown placeholders render as empty strings.
pub struct PlaceholderRenderer {
    out_dir: PathBuf,
}

impl PlaceholderRenderer {
    pub const NAME: &'static str = "text";

    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

pub fn fill_placeholders(body: &str, data: &RenderData) -> String {
    let tables = data.tables_value();
    PLACEHOLDER
        .replace_all(body, |caps: &Captures| {
            let path = &caps[1];
            match lookup(&data.fields, path).or_else(|| lookup_in(&tables, path)) {
                Some(Value::Null) | None => String::new(),
                Some(value) => stringify(value),
            }
        })
        .into_owned()
}

#[async_trait]
impl Renderer for PlaceholderRenderer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, PipelineError> {
        let template_path = &request.template.path;
        let body = match tokio::fs::read_to_string(template_path).await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    "Template '{}' body unreadable at {}: {e}",
                    request.template.id,
                    template_path.display()
                );
                return Ok(RenderOutput::failed(format!(
                    "Template file not found: {}",
                    template_path.display()
                )));
            }
        };

        let format = request.output_format().to_string();
        let path = match output_path(&self.out_dir, request, &format) {
            Ok(path) => path,
            Err(message) => return Ok(RenderOutput::failed(message)),
        };

        let rendered = fill_placeholders(&body, &request.data);
        write_output(&path, rendered.as_bytes()).await?;
        debug!("Job {} rendered to {}", request.job_id, path.display());
        Ok(RenderOutput::written(&path, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::{request, template};
    use serde_json::json;

    fn data() -> RenderData {
        let mut data = RenderData::default();
        data.fields = json!({
            "name": "Ada",
            "amount": 1200.5,
            "customer": {"city": "Paris"},
            "note": null
        })
        .as_object()
        .cloned()
        .unwrap();
        data.tables.insert(
            "lines".into(),
            vec![json!({"sku": "A-1", "qty": 2}).as_object().cloned().unwrap()],
        );
        data
    }

    #[test]
    fn test_fill_fields_nested_and_tables() {
        let out = fill_placeholders(
            "Dear {{name}} of {{ customer.city }}: {{amount}} for {{ lines.0.sku }} x{{lines.0.qty}}",
            &data(),
        );
        assert_eq!(out, "Dear Ada of Paris: 1200.5 for A-1 x2");
    }

    #[test]
    fn test_unknown_and_null_placeholders_are_empty() {
        let out = fill_placeholders("[{{ missing }}][{{note}}][{{ lines.9.sku }}]", &data());
        assert_eq!(out, "[][][]");
    }

    #[test]
    fn test_non_placeholder_braces_untouched() {
        let out = fill_placeholders("{ name } {{ }} {{name}}", &data());
        assert_eq!(out, "{ name } {{ }} Ada");
    }

    #[tokio::test]
    async fn test_render_writes_output_with_format_extension() {
        let dir = tempfile::tempdir().unwrap();
        let body = dir.path().join("letter.txt");
        std::fs::write(&body, "Hello {{name}}").unwrap();
        let out_dir = dir.path().join("out");

        let mut req = request(template("text", body), data());
        req.options.output_format = Some("md".into());
        let output = PlaceholderRenderer::new(&out_dir).render(&req).await.unwrap();

        assert!(output.success);
        assert_eq!(output.output_format.as_deref(), Some("md"));
        let path = out_dir.join(format!("{}.md", req.job_id));
        assert_eq!(output.output_path.as_deref(), Some(path.to_str().unwrap()));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "Hello Ada");
    }

    #[tokio::test]
    async fn test_path_like_output_format_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let body = dir.path().join("letter.txt");
        std::fs::write(&body, "Hello {{name}}").unwrap();
        let out_dir = dir.path().join("a").join("out");

        let mut req = request(template("text", body), data());
        req.options.output_format = Some("x/../../escaped".into());
        let output = PlaceholderRenderer::new(&out_dir).render(&req).await.unwrap();

        assert!(!output.success);
        assert!(output.error_message.unwrap().contains("Invalid output format"));
        assert!(!dir.path().join("escaped").exists());
        assert!(!out_dir.exists());
    }

    #[tokio::test]
    async fn test_missing_template_body_is_unsuccessful() {
        let dir = tempfile::tempdir().unwrap();
        let req = request(template("text", dir.path().join("absent.txt")), data());

        let output = PlaceholderRenderer::new(dir.path()).render(&req).await.unwrap();
        assert!(!output.success);
        assert!(output.error_message.unwrap().contains("Template file not found"));
    }
}
