//! Entity profiles for fixed-schema tables
//!
//! A profile pins the key columns and the columns that count when comparing
//! rows, and carries simple per-field validation rules. Tables browsed
//! without a profile compare every column and have no rules.

use serde::{Deserialize, Serialize};
use tabler_core::{Row, TableSchema, Value};

use crate::filter_builder::FilterSpec;
use crate::snapshot::ColumnSelection;
use crate::value_parser::parse_decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rule {
    /// Non-null and not only whitespace
    NotBlank,
    /// Numeric and greater than zero
    Positive,
    /// Numeric and zero or more
    NonNegative,
}

impl Rule {
    fn check(&self, value: Option<&Value>) -> Result<(), &'static str> {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Rule::NotBlank => match value {
                Value::Null => Err("cannot be empty"),
                Value::String(s) if s.trim().is_empty() => Err("cannot be empty"),
                _ => Ok(()),
            },
            Rule::Positive => match value.as_f64() {
                Some(n) if n > 0.0 => Ok(()),
                Some(_) => Err("must be greater than zero"),
                None => Err("must be a number"),
            },
            Rule::NonNegative => match value.as_f64() {
                Some(n) if n >= 0.0 => Ok(()),
                Some(_) => Err("cannot be negative"),
                None => Err("must be a number"),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub column: String,
    pub rule: Rule,
}

impl FieldRule {
    pub fn new(column: impl Into<String>, rule: Rule) -> Self {
        Self {
            column: column.into(),
            rule,
        }
    }
}

/// Key, comparison and validation settings for one known table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub name: String,
    pub key_columns: Vec<String>,
    pub compared_columns: Vec<String>,
    #[serde(default)]
    pub rules: Vec<FieldRule>,
}

fn names(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

impl EntityProfile {
    pub fn cars() -> Self {
        Self {
            name: "Cars".into(),
            key_columns: names(&["CarID"]),
            compared_columns: names(&["Make", "Model", "Year", "Price"]),
            rules: vec![
                FieldRule::new("Make", Rule::NotBlank),
                FieldRule::new("Model", Rule::NotBlank),
                FieldRule::new("Year", Rule::Positive),
                FieldRule::new("Price", Rule::NonNegative),
            ],
        }
    }

    pub fn employees() -> Self {
        Self {
            name: "Emp_List".into(),
            key_columns: names(&["ID"]),
            compared_columns: names(&[
                "EmployeeNumber",
                "Surname",
                "First Name",
                "Second Name",
                "ID Number",
                "Group Join Date",
                "Last Discharge Date",
                "Initials",
            ]),
            rules: Vec::new(),
        }
    }

    /// Built-in profile whose name matches `table`, ignoring case
    pub fn builtin(table: &str) -> Option<Self> {
        [Self::cars(), Self::employees()]
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(table))
    }

    /// Key, compared and rule columns that `schema` does not have
    pub fn missing_columns(&self, schema: &TableSchema) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        let wanted = self
            .key_columns
            .iter()
            .chain(&self.compared_columns)
            .chain(self.rules.iter().map(|r| &r.column));
        for column in wanted {
            if schema.column(column).is_none() && !missing.contains(column) {
                missing.push(column.clone());
            }
        }
        missing
    }

    pub fn compare_selection(&self) -> ColumnSelection {
        ColumnSelection::Only(self.compared_columns.clone())
    }

    /// One message per broken rule, empty when the row is valid
    pub fn validate(&self, row: &Row) -> Vec<String> {
        self.rules
            .iter()
            .filter_map(|r| {
                r.rule
                    .check(row.get_by_name(&r.column))
                    .err()
                    .map(|msg| format!("{} {}", r.column, msg))
            })
            .collect()
    }
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Int16(_)
            | Value::Int32(_)
            | Value::Int64(_)
            | Value::Float32(_)
            | Value::Float64(_)
            | Value::Decimal(_)
    )
}

fn entry_matches(value: Option<&Value>, text: &str) -> Option<bool> {
    let value = value.unwrap_or(&Value::Null);
    if is_numeric(value) {
        let wanted = parse_decimal(text)?;
        let wanted = Value::Decimal(wanted);
        return Some(value.same_as(&wanted));
    }
    if value.is_null() {
        return Some(false);
    }
    Some(
        value
            .to_string()
            .to_lowercase()
            .contains(&text.to_lowercase()),
    )
}

/// Filter already-loaded rows.
///
/// Text matches case-insensitively anywhere in the value; numeric values must
/// equal the parsed number. Entries whose text does not parse as a number for
/// a numeric value are ignored, as in the database filter.
pub fn filter_rows<'a>(rows: &'a [Row], filters: &FilterSpec) -> Vec<&'a Row> {
    rows.iter()
        .filter(|row| {
            filters.active().all(|entry| {
                entry_matches(row.get_by_name(entry.column.trim()), entry.text.trim())
                    .unwrap_or(true)
            })
        })
        .collect()
}
