use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::models::mapping::MappingConfig;

/// A mapping file as loaded from disk.
#[derive(Debug, Clone, PartialEq)]
enum RawMapping {
    Parsed(Value),
    /// The file text, kept so resolve() can report the syntax error per use.
    Invalid(String),
}

/// Mapping configurations keyed by id (the file stem under the mapping dir).
///
/// Entries are kept as raw JSON so one malformed mapping degrades only the
/// documents that use it instead of failing startup.
#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    mappings: HashMap<String, RawMapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn insert(&mut self, id: impl Into<String>, raw: Value) {
        self.mappings.insert(id.into(), RawMapping::Parsed(raw));
    }

    /// Registers mapping file text, parsing it now if it is valid JSON.
    pub fn insert_text(&mut self, id: impl Into<String>, text: String) {
        let id = id.into();
        let raw = match serde_json::from_str(&text) {
            Ok(value) => RawMapping::Parsed(value),
            Err(e) => {
                warn!("Mapping '{id}' is not valid JSON: {e}");
                RawMapping::Invalid(text)
            }
        };
        self.mappings.insert(id, raw);
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        if !dir.is_dir() {
            warn!("Mapping directory {} does not exist; no mappings loaded", dir.display());
            return Ok(registry);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            registry.insert_text(id, text);
        }

        info!("Loaded {} mappings from {}", registry.mappings.len(), dir.display());
        Ok(registry)
    }

    /// `None` when no mapping has this id; `Some(Err)` when it exists but
    /// does not parse as a mapping configuration.
    pub fn resolve(&self, id: &str) -> Option<Result<MappingConfig, PipelineError>> {
        let raw = self.mappings.get(id)?;
        Some(match raw {
            RawMapping::Parsed(value) => MappingConfig::from_value(value.clone()),
            RawMapping::Invalid(text) => MappingConfig::from_json_str(text),
        })
    }
}
