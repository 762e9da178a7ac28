//! Field transformations: ordered, field-scoped value rewrites.
//!
//! Each rule runs in isolation: a failure is recorded as a diagnostic and the
//! next rule still runs against whatever the fields hold at that point.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::{Map, Value};
use tracing::debug;

use crate::models::dataset::Fields;
use crate::models::mapping::TransformationRule;

const DEFAULT_DECIMAL_PLACES: u32 = 2;
const MAX_DECIMAL_PLACES: u32 = 28;
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("USD", "$"),
    ("EUR", "€"),
    ("GBP", "£"),
    ("JPY", "¥"),
    ("INR", "₹"),
];

/// Diagnostics collected while applying a batch of rules.
#[derive(Debug, Default)]
pub struct TransformReport {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

enum Outcome {
    Applied,
    Skipped(String),
}

/// Applies `rules` to `fields` in order.
///
/// `scope` prefixes every diagnostic (e.g. `Table 'lines' row 2: `); pass an
/// empty string for top-level fields.
pub fn apply_transformations(
    fields: &mut Fields,
    rules: &[TransformationRule],
    scope: &str,
    report: &mut TransformReport,
) {
    for rule in rules {
        match apply_rule(fields, rule) {
            Ok(Outcome::Applied) => {
                debug!("{scope}applied '{}' to '{}'", rule.kind, rule.field);
            }
            Ok(Outcome::Skipped(reason)) => report.warnings.push(format!(
                "{scope}Transformation '{}' on field '{}' skipped: {reason}",
                rule.kind, rule.field
            )),
            Err(reason) => report.errors.push(format!(
                "{scope}Transformation '{}' on field '{}' failed: {reason}",
                rule.kind, rule.field
            )),
        }
    }
}

fn apply_rule(fields: &mut Fields, rule: &TransformationRule) -> Result<Outcome, String> {
    if rule.kind == "concatenate" {
        let joined = concatenate(fields, &rule.params)?;
        fields.insert(rule.field.clone(), Value::String(joined));
        return Ok(Outcome::Applied);
    }

    let Some(current) = fields.get(&rule.field) else {
        return Ok(Outcome::Skipped("field is not mapped".to_string()));
    };

    let updated = match rule.kind.as_str() {
        "date_format" => date_format(current, &rule.params)?,
        "currency_format" => currency_format(current, &rule.params)?,
        "uppercase" => Value::String(stringify(current).to_uppercase()),
        "lowercase" => Value::String(stringify(current).to_lowercase()),
        "replace" => replace(current, &rule.params)?,
        other => return Err(format!("unknown transformation type '{other}'")),
    };

    fields.insert(rule.field.clone(), updated);
    Ok(Outcome::Applied)
}

fn date_format(current: &Value, params: &Map<String, Value>) -> Result<Value, String> {
    let input_format = required_str(params, "inputFormat")?;
    let output_format = required_str(params, "outputFormat")?;

    if StrftimeItems::new(output_format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid outputFormat '{output_format}'"));
    }

    let text = stringify(current);
    let Some(parsed) = parse_datetime(&text, input_format) else {
        // Unparseable input stays as it was.
        return Ok(current.clone());
    };

    let mut formatted = String::new();
    write!(formatted, "{}", parsed.format(output_format))
        .map_err(|_| format!("outputFormat '{output_format}' cannot format this value"))?;
    Ok(Value::String(formatted))
}

fn parse_datetime(text: &str, format: &str) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_str(text, format) {
        return Some(dt);
    }
    let utc = FixedOffset::east_opt(0)?;
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Some(utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(text, format)
        .ok()
        .map(|date| utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn currency_format(current: &Value, params: &Map<String, Value>) -> Result<Value, String> {
    let decimal_places = match params.get("decimalPlaces") {
        None | Some(Value::Null) => DEFAULT_DECIMAL_PLACES,
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .filter(|n| *n <= MAX_DECIMAL_PLACES)
            .ok_or_else(|| format!("decimalPlaces must be an integer 0..={MAX_DECIMAL_PLACES}"))?,
    };
    let include_symbol = params
        .get("includeSymbol")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let currency = params
        .get("currency")
        .and_then(Value::as_str)
        .unwrap_or("USD");

    let text = stringify(current);
    if text.trim().is_empty() {
        return Ok(current.clone());
    }
    let amount = parse_decimal(&text).ok_or_else(|| format!("'{text}' is not a number"))?;

    Ok(Value::String(format_currency(
        amount,
        decimal_places,
        include_symbol.then_some(currency),
    )))
}

/// Formats `amount` with thousands separators and fixed decimals, optionally
/// prefixed by the currency's symbol (or its code when no symbol is known).
pub fn format_currency(amount: Decimal, decimal_places: u32, currency: Option<&str>) -> String {
    let rounded =
        amount.round_dp_with_strategy(decimal_places, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let digits = format!("{:.*}", decimal_places as usize, rounded.abs());

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }

    let prefix = match currency {
        None => String::new(),
        Some(code) => CURRENCY_SYMBOLS
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .map(|(_, symbol)| symbol.to_string())
            .unwrap_or_else(|| format!("{} ", code.to_uppercase())),
    };

    let sign = if negative { "-" } else { "" };
    format!("{sign}{prefix}{grouped}")
}

fn concatenate(fields: &Fields, params: &Map<String, Value>) -> Result<String, String> {
    let names = params
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing 'fields' list".to_string())?;
    let separator = params
        .get("separator")
        .and_then(Value::as_str)
        .unwrap_or(" ");

    let parts: Vec<String> = names
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|name| fields.get(name))
        .map(stringify)
        .filter(|s| !s.is_empty())
        .collect();

    Ok(parts.join(separator))
}

fn replace(current: &Value, params: &Map<String, Value>) -> Result<Value, String> {
    let pattern = required_str(params, "pattern")?;
    if pattern.is_empty() {
        return Err("'pattern' must not be empty".to_string());
    }
    let replacement = params
        .get("replacement")
        .and_then(Value::as_str)
        .unwrap_or("");
    Ok(Value::String(stringify(current).replace(pattern, replacement)))
}

fn required_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing '{key}' parameter"))
}

/// Text form of a value: strings verbatim, null as empty, everything else as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses a decimal from a JSON number or numeric text. Tolerates thousands
/// separators, surrounding whitespace and a leading currency symbol.
pub fn parse_decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string()),
        Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, trimmed),
    };
    let unsigned = CURRENCY_SYMBOLS
        .iter()
        .find_map(|(_, symbol)| unsigned.strip_prefix(symbol))
        .unwrap_or(unsigned)
        .trim_start();
    let cleaned: String = unsigned.chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }

    let parsed = Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()?;
    Some(if negative { -parsed } else { parsed })
}
