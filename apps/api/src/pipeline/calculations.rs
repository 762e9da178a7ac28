//! Calculated fields, computed with exact decimal arithmetic.
//!
//! Results are stored as normalised decimal strings so no precision is lost
//! between here and the renderer.

use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::models::dataset::{Dataset, Fields};
use crate::models::mapping::CalculatedField;
use crate::pipeline::path::{lookup_dataset, lookup_in};
use crate::pipeline::transforms::parse_decimal_value;

/// Evaluates one calculated field against the source and the fields mapped so far.
pub fn evaluate<D: Dataset + ?Sized>(
    calc: &CalculatedField,
    source: &D,
    mapped: &Fields,
) -> Result<Value, String> {
    let result = match calc.kind.as_str() {
        "sum" => sum_over_source(source, &calc.params)?,
        "multiply" => multiply(mapped, &calc.params)?,
        "add" => add(mapped, &calc.params)?,
        other => return Err(format!("unknown calculation type '{other}'")),
    };
    Ok(decimal_value(result))
}

pub fn decimal_value(d: Decimal) -> Value {
    Value::String(d.normalize().to_string())
}

fn sum_over_source<D: Dataset + ?Sized>(
    source: &D,
    params: &Map<String, Value>,
) -> Result<Decimal, String> {
    let path = str_param(params, "source")?;
    let field = str_param(params, "field")?;

    let rows = match lookup_dataset(source, path) {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(format!("source '{path}' is not an array")),
        None => return Err(format!("source '{path}' not found")),
    };

    let mut total = Decimal::ZERO;
    for (index, row) in rows.iter().enumerate() {
        let Some(cell) = lookup_in(row, field).filter(|v| !v.is_null()) else {
            continue;
        };
        let amount = parse_decimal_value(cell)
            .ok_or_else(|| format!("row {index} field '{field}' is not numeric: {cell}"))?;
        total = total
            .checked_add(amount)
            .ok_or_else(|| "sum overflowed".to_string())?;
    }
    Ok(total)
}

fn multiply(mapped: &Fields, params: &Map<String, Value>) -> Result<Decimal, String> {
    let field = str_param(params, "field")?;
    let multiplier = params
        .get("multiplier")
        .and_then(parse_decimal_value)
        .ok_or_else(|| "missing or non-numeric 'multiplier'".to_string())?;

    let value = mapped
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| format!("field '{field}' is not mapped"))?;
    let base = parse_decimal_value(value)
        .ok_or_else(|| format!("field '{field}' is not numeric: {value}"))?;

    base.checked_mul(multiplier)
        .ok_or_else(|| "multiplication overflowed".to_string())
}

fn add(mapped: &Fields, params: &Map<String, Value>) -> Result<Decimal, String> {
    let names = params
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing 'fields' list".to_string())?;

    let mut total = Decimal::ZERO;
    for name in names {
        let name = name
            .as_str()
            .ok_or_else(|| format!("field name {name} is not a string"))?;
        // Missing and null operands count as zero.
        let Some(value) = mapped.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let amount = parse_decimal_value(value)
            .ok_or_else(|| format!("field '{name}' is not numeric: {value}"))?;
        total = total
            .checked_add(amount)
            .ok_or_else(|| "addition overflowed".to_string())?;
    }
    Ok(total)
}

fn str_param<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing '{key}' parameter"))
}
