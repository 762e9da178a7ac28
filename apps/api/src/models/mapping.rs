use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::errors::PipelineError;
use crate::models::dataset::Fields;

/// Declarative mapping configuration. Read-only input to the mapper.
///
/// Transformation and calculated-field parameters are kept loosely typed and
/// interpreted when applied, so one malformed rule fails on its own instead of
/// rejecting the whole configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfig {
    /// Target field name → rule. Order is evaluation order.
    #[serde(default)]
    pub field_mappings: Map<String, Value>,
    #[serde(default)]
    pub transformations: Vec<TransformationRule>,
    #[serde(default)]
    pub table_mappings: BTreeMap<String, TableMapping>,
    #[serde(default)]
    pub calculated_fields: Vec<CalculatedField>,
    #[serde(default)]
    pub post_processing: PostProcessing,
}

impl MappingConfig {
    pub fn from_value(value: Value) -> Result<Self, PipelineError> {
        let config: MappingConfig = serde_json::from_value(value)
            .map_err(|e| PipelineError::Mapping(format!("Invalid mapping config: {e}")))?;
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PipelineError::Mapping(format!("Mapping config is not JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Parses every field rule; a rule that cannot be read is reported with its
    /// target name.
    pub fn field_rules(&self) -> Vec<(String, Result<FieldRule, String>)> {
        self.field_mappings
            .iter()
            .map(|(target, raw)| (target.clone(), FieldRule::from_value(raw)))
            .collect()
    }
}

/// A single target ← source rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub source: String,
    #[serde(default)]
    pub fallback: Vec<String>,
    /// An explicit `null` default is kept as `Some(Value::Null)`.
    #[serde(
        default,
        deserialize_with = "deserialize_present",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl FieldRule {
    pub fn short(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fallback: Vec::new(),
            default: None,
        }
    }

    /// Accepts both the short form (`"a.b"`) and the full object form.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(source) => Ok(Self::short(source.clone())),
            Value::Object(_) => serde_json::from_value(value.clone()).map_err(|e| e.to_string()),
            other => Err(format!("expected string or object rule, got {other}")),
        }
    }
}

/// One field-scoped transformation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationRule {
    pub field: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl TransformationRule {
    #[cfg(test)]
    pub fn new(field: impl Into<String>, kind: impl Into<String>, params: Value) -> Self {
        Self {
            field: field.into(),
            kind: kind.into(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

/// Reshapes a source array into an output table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub source: String,
    /// Source column → output column. Empty keeps rows whole.
    #[serde(default)]
    pub columns: Map<String, Value>,
    #[serde(default)]
    pub transformations: Vec<TransformationRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CalculatedField {
    #[cfg(test)]
    pub fn new(name: impl Into<String>, kind: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: match params {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostProcessing {
    #[serde(default)]
    pub remove_nulls: bool,
    #[serde(default)]
    pub remove_empty_arrays: bool,
    #[serde(default)]
    pub trim_strings: bool,
}

/// Result of one mapping call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappedDataset {
    pub fields: Fields,
    pub tables: BTreeMap<String, Vec<Fields>>,
    /// Target field → path (or `<default>`) it was resolved from.
    pub field_sources: BTreeMap<String, String>,
    pub unmapped_fields: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub success: bool,
}
