use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat-or-nested record of named values. Insertion order is preserved.
pub type Fields = Map<String, Value>;

/// Key under which merged line items carry the id of the dataset they came from.
pub const ITEM_SOURCE_KEY: &str = "_source";

/// Conflict policy used when combining several source datasets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Input order is priority; first non-null value wins.
    #[default]
    #[serde(alias = "PRIORITIZED")]
    Prioritized,
    /// Highest completeness score wins; ties keep the earlier dataset.
    #[serde(alias = "BEST_AVAILABLE", alias = "bestAvailable")]
    BestAvailable,
    /// Only fields present in every dataset survive.
    #[serde(alias = "ALL_REQUIRED", alias = "allRequired")]
    AllRequired,
}

/// One provider's fetched view of a single underlying document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDataset {
    #[serde(default)]
    pub fields: Fields,
    #[serde(default)]
    pub items: Vec<Fields>,
    #[serde(default)]
    pub source_id: String,
}

impl SourceDataset {
    pub fn new(source_id: impl Into<String>, fields: Fields) -> Self {
        Self {
            fields,
            items: Vec::new(),
            source_id: source_id.into(),
        }
    }

    #[cfg(test)]
    pub fn with_items(mut self, items: Vec<Fields>) -> Self {
        self.items = items;
        self
    }
}

/// Result of one merge invocation. Never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDataset {
    pub fields: Fields,
    pub items: Vec<Fields>,
    /// Exactly one entry per key in `fields`.
    pub field_sources: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_scores: Option<BTreeMap<String, u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_field_count: Option<usize>,
    pub strategy: MergeStrategy,
}

impl MergedDataset {
    /// Source id that supplied `field`, if the field was merged.
    pub fn source_of(&self, field: &str) -> Option<&str> {
        self.field_sources.get(field).map(String::as_str)
    }

    /// Completeness score recorded for `field` under BestAvailable.
    pub fn score_of(&self, field: &str) -> Option<u8> {
        self.field_scores.as_ref()?.get(field).copied()
    }
}

/// Read access shared by single-source and merged datasets, so the mapper
/// accepts either.
pub trait Dataset {
    fn fields(&self) -> &Fields;
    fn items(&self) -> &[Fields];
}

impl Dataset for SourceDataset {
    fn fields(&self) -> &Fields {
        &self.fields
    }

    fn items(&self) -> &[Fields] {
        &self.items
    }
}

impl Dataset for MergedDataset {
    fn fields(&self) -> &Fields {
        &self.fields
    }

    fn items(&self) -> &[Fields] {
        &self.items
    }
}
