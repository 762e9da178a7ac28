//! Template and mapping lookup, loaded once at startup from disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub mod mappings;

pub use mappings::MappingRegistry;

pub const TEMPLATE_INDEX_FILE: &str = "templates.json";

fn default_renderer() -> String {
    "text".to_string()
}

fn default_output_format() -> String {
    "txt".to_string()
}

/// One entry of `templates.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    pub id: String,
    pub name: String,
    /// Template body location; relative paths are resolved against the
    /// template directory at load time.
    pub path: PathBuf,
    /// Name of the renderer that handles this template.
    #[serde(default = "default_renderer")]
    pub renderer: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Mapping used when the request does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, TemplateMetadata>,
}

impl TemplateRegistry {
    pub fn new(templates: impl IntoIterator<Item = TemplateMetadata>) -> Self {
        Self {
            templates: templates
                .into_iter()
                .map(|template| (template.id.clone(), template))
                .collect(),
        }
    }

    /// Reads `<dir>/templates.json`. A missing index yields an empty registry.
    pub fn load(dir: &Path) -> Result<Self> {
        let index = dir.join(TEMPLATE_INDEX_FILE);
        if !index.exists() {
            warn!("No template index at {}; starting with no templates", index.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&index)
            .with_context(|| format!("Failed to read {}", index.display()))?;
        let mut templates: Vec<TemplateMetadata> = serde_json::from_str(&text)
            .with_context(|| format!("Malformed template index {}", index.display()))?;

        for template in &mut templates {
            if template.path.is_relative() {
                template.path = dir.join(&template.path);
            }
        }

        info!("Loaded {} templates from {}", templates.len(), index.display());
        Ok(Self::new(templates))
    }

    pub fn get(&self, id: &str) -> Option<&TemplateMetadata> {
        self.templates.get(id)
    }

    /// All templates sorted by id.
    pub fn list(&self) -> Vec<&TemplateMetadata> {
        let mut templates: Vec<&TemplateMetadata> = self.templates.values().collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_applies_defaults_and_resolves_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(TEMPLATE_INDEX_FILE),
            json!([
                {"id": "letter", "name": "Offer letter", "path": "letter.txt"},
                {"id": "invoice", "name": "Invoice", "path": "/abs/invoice.json",
                 "renderer": "json", "outputFormat": "json", "mappingId": "invoice-v2"}
            ])
            .to_string(),
        )
        .unwrap();

        let registry = TemplateRegistry::load(dir.path()).unwrap();

        let letter = registry.get("letter").unwrap();
        assert_eq!(letter.renderer, "text");
        assert_eq!(letter.output_format, "txt");
        assert_eq!(letter.path, dir.path().join("letter.txt"));
        assert!(letter.mapping_id.is_none());

        let invoice = registry.get("invoice").unwrap();
        assert_eq!(invoice.path, PathBuf::from("/abs/invoice.json"));
        assert_eq!(invoice.mapping_id.as_deref(), Some("invoice-v2"));

        let ids: Vec<&str> = registry.list().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["invoice", "letter"]);
    }

    #[test]
    fn test_missing_index_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = TemplateRegistry::load(dir.path()).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_malformed_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TEMPLATE_INDEX_FILE), "{\"id\": 1}").unwrap();
        assert!(TemplateRegistry::load(dir.path()).is_err());
    }
}
