//! Completeness scoring: a frozen, deterministic heuristic rating how usable a
//! candidate field value is (0–100). Consumed only by the BestAvailable merge.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

const PLACEHOLDERS: &[&str] = &["N/A", "TBD", "NULL", "NONE", "[", "]"];
const INCOMPLETE_MARKERS: &[&str] = &["[", "TBD", "TODO"];

const PLACEHOLDER_SCORE: u8 = 5;
const BASE_SCORE: u32 = 50;
const LENGTH_10_BONUS: u32 = 15;
const LENGTH_50_BONUS: u32 = 10;
const DATE_BONUS: u32 = 15;
const POSITIVE_NUMBER_BONUS: u32 = 10;
const NO_MARKER_BONUS: u32 = 10;
const MAX_SCORE: u32 = 100;

static ISO_DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").expect("valid date regex"));
static PLAIN_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?$").expect("valid number regex"));

/// Scores a candidate value.
///
/// - null or empty string → 0
/// - placeholder (`N/A`, `TBD`, `NULL`, `NONE`, `[`, `]`, trimmed, any case) → 5
/// - otherwise 50, plus: +15 if longer than 10 chars, +10 more if longer than 50,
///   +15 for a leading `YYYY-MM-DD`, +10 for a positive plain number,
///   +10 when free of `[` / `TBD` / `TODO`; capped at 100.
///
/// Numbers and booleans are scored on their text form; arrays and objects score 0.
pub fn score(value: &Value) -> u8 {
    let text = match value {
        Value::Null => return 0,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => return 0,
    };
    score_text(&text)
}

fn score_text(text: &str) -> u8 {
    if text.is_empty() {
        return 0;
    }

    let trimmed_upper = text.trim().to_uppercase();
    if PLACEHOLDERS.contains(&trimmed_upper.as_str()) {
        return PLACEHOLDER_SCORE;
    }

    let mut total = BASE_SCORE;
    let length = text.chars().count();

    if length > 10 {
        total += LENGTH_10_BONUS;
    }
    if length > 50 {
        total += LENGTH_50_BONUS;
    }
    if ISO_DATE_PREFIX.is_match(text) {
        total += DATE_BONUS;
    }
    if is_positive_number(text) {
        total += POSITIVE_NUMBER_BONUS;
    }

    let upper = text.to_uppercase();
    if !INCOMPLETE_MARKERS.iter().any(|m| upper.contains(m)) {
        total += NO_MARKER_BONUS;
    }

    total.min(MAX_SCORE) as u8
}

fn is_positive_number(text: &str) -> bool {
    PLAIN_NUMBER.is_match(text)
        && text
            .parse::<Decimal>()
            .map(|d| d > Decimal::ZERO)
            .unwrap_or(false)
}
