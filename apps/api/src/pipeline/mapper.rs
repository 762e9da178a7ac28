//! Field mapping: reshapes a source or merged dataset into the target field
//! set a template expects.
//!
//! Order within one call: field rules → transformations → tables →
//! calculated fields → post-processing. Mapping degrades instead of aborting:
//! every failure becomes a warning or an error on the result, and whatever was
//! mapped is still returned.

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::dataset::{Dataset, Fields};
use crate::models::mapping::{FieldRule, MappedDataset, MappingConfig, PostProcessing, TableMapping};
use crate::pipeline::calculations;
use crate::pipeline::path::{lookup_dataset, lookup_present};
use crate::pipeline::transforms::{apply_transformations, TransformReport};

/// Attribution recorded for fields filled from a rule's default.
pub const DEFAULT_SOURCE: &str = "<default>";

/// Maps `source` through `config`.
pub fn map_data<D: Dataset + ?Sized>(source: &D, config: &MappingConfig) -> MappedDataset {
    let mut result = MappedDataset::default();

    map_fields(source.fields(), config, &mut result);

    let mut report = TransformReport::default();
    apply_transformations(&mut result.fields, &config.transformations, "", &mut report);
    result.warnings.append(&mut report.warnings);
    result.errors.append(&mut report.errors);

    for (name, table) in &config.table_mappings {
        let rows = map_table(source, name, table, &mut result);
        result.tables.insert(name.clone(), rows);
    }

    for calc in &config.calculated_fields {
        match calculations::evaluate(calc, source, &result.fields) {
            Ok(value) => {
                result.fields.insert(calc.name.clone(), value);
            }
            Err(reason) => {
                warn!("Calculated field '{}' failed: {reason}", calc.name);
                result.errors.push(format!(
                    "Calculated field '{}' ({}) failed: {reason}",
                    calc.name, calc.kind
                ));
            }
        }
    }

    post_process(&mut result.fields, config.post_processing);

    // A name is either resolved or unmapped, never both.
    let MappedDataset {
        fields,
        unmapped_fields,
        ..
    } = &mut result;
    unmapped_fields.retain(|name| !fields.contains_key(name));

    result.success = result.errors.is_empty();

    debug!(
        "Mapped {} fields, {} tables ({} unmapped, {} warnings, {} errors)",
        result.fields.len(),
        result.tables.len(),
        result.unmapped_fields.len(),
        result.warnings.len(),
        result.errors.len()
    );

    result
}

fn map_fields(source: &Fields, config: &MappingConfig, result: &mut MappedDataset) {
    for (target, rule) in config.field_rules() {
        let rule = match rule {
            Ok(rule) => rule,
            Err(reason) => {
                result
                    .errors
                    .push(format!("Field mapping for '{target}' is invalid: {reason}"));
                continue;
            }
        };

        match resolve_rule(source, &rule) {
            Some((value, from)) => {
                result.fields.insert(target.clone(), value);
                result.field_sources.insert(target, from);
            }
            None => {
                if !result.unmapped_fields.contains(&rule.source) {
                    result.unmapped_fields.push(rule.source.clone());
                }
            }
        }
    }
}

/// Source path, then fallbacks in order, then the default.
fn resolve_rule(source: &Fields, rule: &FieldRule) -> Option<(Value, String)> {
    std::iter::once(&rule.source)
        .chain(rule.fallback.iter())
        .find_map(|path| lookup_present(source, path).map(|v| (v.clone(), path.clone())))
        .or_else(|| {
            rule.default
                .clone()
                .map(|value| (value, DEFAULT_SOURCE.to_string()))
        })
}

fn map_table<D: Dataset + ?Sized>(
    source: &D,
    name: &str,
    table: &TableMapping,
    result: &mut MappedDataset,
) -> Vec<Fields> {
    let rows = match lookup_dataset(source, &table.source) {
        Some(Value::Array(rows)) => rows,
        Some(_) => {
            result.warnings.push(format!(
                "Table '{name}': source '{}' is not an array",
                table.source
            ));
            return Vec::new();
        }
        None => {
            result.warnings.push(format!(
                "Table '{name}': source '{}' not found",
                table.source
            ));
            return Vec::new();
        }
    };

    let mut output = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let Value::Object(row) = row else {
            result
                .warnings
                .push(format!("Table '{name}' row {index}: not an object, skipped"));
            continue;
        };

        let mut renamed = rename_columns(row, table, name, index, result);

        let mut report = TransformReport::default();
        let scope = format!("Table '{name}' row {index}: ");
        apply_transformations(&mut renamed, &table.transformations, &scope, &mut report);
        result.warnings.append(&mut report.warnings);
        result.errors.append(&mut report.errors);

        output.push(renamed);
    }
    output
}

fn rename_columns(
    row: Fields,
    table: &TableMapping,
    name: &str,
    index: usize,
    result: &mut MappedDataset,
) -> Fields {
    if table.columns.is_empty() {
        return row;
    }

    let mut renamed = Fields::new();
    for (from, to) in &table.columns {
        let Some(to) = to.as_str() else {
            result.warnings.push(format!(
                "Table '{name}': column mapping for '{from}' is not a string"
            ));
            continue;
        };
        if let Some(value) = row.get(from) {
            renamed.insert(to.to_string(), value.clone());
        } else if index == 0 {
            debug!("Table '{name}': column '{from}' absent in first row");
        }
    }
    renamed
}

fn post_process(fields: &mut Fields, flags: PostProcessing) {
    if flags.remove_nulls {
        fields.retain(|_, v| !v.is_null());
    }
    if flags.remove_empty_arrays {
        fields.retain(|_, v| !matches!(v, Value::Array(items) if items.is_empty()));
    }
    if flags.trim_strings {
        for value in fields.values_mut() {
            if let Value::String(s) = value {
                let trimmed = s.trim();
                if trimmed.len() != s.len() {
                    *s = trimmed.to_string();
                }
            }
        }
    }
}
