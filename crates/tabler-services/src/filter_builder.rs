//! Dynamic filter builder
//!
//! Turns up to [`MAX_FILTERS`] `(column, text)` pairs into a parameterized
//! predicate. Values are always bound, never interpolated; column names are
//! validated against the described schema and quoted by the dialect.

use serde::{Deserialize, Serialize};
use tabler_core::{Dialect, TableSchema, TypeCategory, Value};

use crate::error::{ServiceError, ServiceResult};
use crate::value_parser::{parse_date, parse_decimal, parse_integer};

/// Number of filter slots a browse view offers
pub const MAX_FILTERS: usize = 3;

/// One filter slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterEntry {
    pub column: String,
    pub text: String,
}

impl FilterEntry {
    pub fn new(column: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            text: text.into(),
        }
    }

    /// Entries with a blank column or blank text are ignored
    pub fn is_active(&self) -> bool {
        !self.column.trim().is_empty() && !self.text.trim().is_empty()
    }
}

/// The filter slots of a browse view
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    entries: Vec<FilterEntry>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(column, text)` pairs, failing when there are more than
    /// [`MAX_FILTERS`]
    pub fn from_pairs<I, C, T>(pairs: I) -> ServiceResult<Self>
    where
        I: IntoIterator<Item = (C, T)>,
        C: Into<String>,
        T: Into<String>,
    {
        let mut spec = Self::new();
        for (column, text) in pairs {
            spec.push(FilterEntry::new(column, text))?;
        }
        Ok(spec)
    }

    pub fn push(&mut self, entry: FilterEntry) -> ServiceResult<()> {
        if self.entries.len() >= MAX_FILTERS {
            return Err(ServiceError::ValidationFailed(vec![format!(
                "at most {} filters can be applied",
                MAX_FILTERS
            )]));
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[FilterEntry] {
        &self.entries
    }

    pub fn active(&self) -> impl Iterator<Item = &FilterEntry> {
        self.entries.iter().filter(|e| e.is_active())
    }

    pub fn is_empty(&self) -> bool {
        self.active().next().is_none()
    }
}

/// A value bound to a placeholder. `name` is `param_<index>`, unique within
/// one predicate; binding itself is positional.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub value: Value,
}

/// A WHERE clause body plus its parameters in placeholder order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// `None` when no filter is active
    pub clause: Option<String>,
    pub params: Vec<BoundParameter>,
}

impl Predicate {
    /// No filtering at all
    pub fn none() -> Self {
        Self::default()
    }

    /// Parameter values in binding order
    pub fn values(&self) -> Vec<Value> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }
}

/// Builds [`Predicate`]s from [`FilterSpec`]s
pub struct FilterBuilder;

impl FilterBuilder {
    /// Build the predicate for `filters` against `schema`.
    ///
    /// - Text columns: `LIKE '%' + text + '%'`
    /// - Integer, decimal and date columns: equality once the text parses;
    ///   an entry that does not parse is skipped
    /// - Any other column: converted to text and matched with `LIKE`
    ///
    /// Active entries naming an unknown column fail with `InvalidIdentifier`.
    pub fn build(
        schema: &TableSchema,
        filters: &FilterSpec,
        dialect: &dyn Dialect,
    ) -> ServiceResult<Predicate> {
        let mut conditions = Vec::new();
        let mut params: Vec<BoundParameter> = Vec::new();

        for entry in filters.active() {
            let column = schema.validate_identifier(entry.column.trim())?;
            let text = entry.text.trim();
            let column_sql = dialect.quote_identifier(&column.name);

            let (value, contains) = match column.category {
                TypeCategory::Text => (Some(Value::String(text.to_string())), true),
                TypeCategory::Integer => (parse_integer(text).map(Value::Int64), false),
                TypeCategory::Decimal => (parse_decimal(text).map(Value::Decimal), false),
                TypeCategory::Date => (parse_date(text), false),
                TypeCategory::Boolean | TypeCategory::Other => {
                    (Some(Value::String(text.to_string())), true)
                }
            };

            let Some(value) = value else {
                tracing::debug!(
                    column = %column.name,
                    category = %column.category,
                    text = %text,
                    "filter text does not parse for column type, skipping"
                );
                continue;
            };

            let position = params.len() + 1;
            let placeholder = dialect.placeholder(position);
            let condition = match (contains, column.category) {
                (true, TypeCategory::Text) => dialect.contains_predicate(&column_sql, &placeholder),
                (true, _) => {
                    dialect.contains_predicate(&dialect.cast_to_text(&column_sql), &placeholder)
                }
                (false, _) => format!("{} = {}", column_sql, placeholder),
            };

            conditions.push(condition);
            params.push(BoundParameter {
                name: format!("param_{}", position - 1),
                value,
            });
        }

        let clause = (!conditions.is_empty()).then(|| conditions.join(" AND "));
        Ok(Predicate { clause, params })
    }
}
