//! Parsing user-entered text into typed cell values

use chrono::{NaiveDate, NaiveDateTime};
use tabler_core::{ColumnInfo, TypeCategory, Value};

use crate::error::{ServiceError, ServiceResult};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Whole number, with an optional sign
pub fn parse_integer(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Plain decimal notation (`-12`, `3.50`, `.5`), returned unchanged.
///
/// Exponents, thousands separators and non-finite values are rejected so
/// the text can be handed to the server as an exact numeric.
pub fn parse_decimal(text: &str) -> Option<String> {
    let text = text.trim();
    let digits = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);

    let mut seen_dot = false;
    let mut seen_digit = false;
    for ch in digits.chars() {
        match ch {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    seen_digit.then(|| text.to_string())
}

/// `YYYY-MM-DD`, `MM/DD/YYYY`, optionally followed by `HH:MM[:SS]`
/// (space or `T` separated)
pub fn parse_date(text: &str) -> Option<Value> {
    let text = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(Value::Date(date));
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Value::DateTime(datetime));
        }
    }
    None
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Some(true),
        "false" | "f" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Convert text typed for `column` into a value of the column's category.
///
/// Empty text and the literal `NULL` become `Value::Null` except for text
/// columns, where empty text stays an empty string.
pub fn parse_cell_value(column: &ColumnInfo, text: &str) -> ServiceResult<Value> {
    if text.trim().eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if column.category == TypeCategory::Text {
        return Ok(Value::String(text.to_string()));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    let invalid = || {
        ServiceError::ValidationFailed(vec![format!(
            "'{}' is not a valid {} value for column {}",
            text, column.category, column.name
        )])
    };

    match column.category {
        TypeCategory::Integer => parse_integer(text).map(Value::Int64).ok_or_else(invalid),
        TypeCategory::Decimal => parse_decimal(text).map(Value::Decimal).ok_or_else(invalid),
        TypeCategory::Date => parse_date(text).ok_or_else(invalid),
        TypeCategory::Boolean => parse_bool(text).map(Value::Bool).ok_or_else(invalid),
        TypeCategory::Text | TypeCategory::Other => Ok(Value::String(text.to_string())),
    }
}
