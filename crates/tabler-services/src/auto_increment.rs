//! Client-side auto-increment for integer columns the server does not fill
//!
//! Non-nullable integer columns that are neither identity nor key columns get
//! `MAX(column) + 1, + 2, ...` assigned to the added rows that left them
//! empty. Two writers resolving against the same table at the same time can
//! pick the same values; the server's constraints are the only guard.

use std::collections::BTreeMap;
use tabler_core::{ColumnInfo, Connection, Row, TableSchema, TypeCategory, Value};

use crate::error::{ServiceError, ServiceResult};

/// Next value to hand out per column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoIncrementPlan {
    pub next: BTreeMap<String, i64>,
}

impl AutoIncrementPlan {
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

/// Whether the resolver assigns values to this column
pub fn is_eligible(column: &ColumnInfo) -> bool {
    column.category == TypeCategory::Integer
        && !column.nullable
        && !column.is_identity
        && !column.is_primary_key
}

/// Null, integer zero and empty strings count as "not filled in"
pub fn needs_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(v) if v.is_integer() => v.as_i64() == Some(0),
        Some(_) => false,
    }
}

pub struct AutoIncrementResolver;

impl AutoIncrementResolver {
    /// Columns of `schema` that at least one of `rows` needs a value for
    pub fn needed_columns<'a>(schema: &'a TableSchema, rows: &[Row]) -> Vec<&'a ColumnInfo> {
        schema
            .columns()
            .iter()
            .filter(|c| is_eligible(c))
            .filter(|c| rows.iter().any(|row| needs_value(row.get_by_name(&c.name))))
            .collect()
    }

    /// Seed every needed column from the table's current maximum.
    ///
    /// Columns no row needs are not queried.
    #[tracing::instrument(skip_all, fields(table = %schema.name(), rows = rows.len()))]
    pub async fn resolve(
        connection: &dyn Connection,
        schema: &TableSchema,
        rows: &[Row],
    ) -> ServiceResult<AutoIncrementPlan> {
        let mut plan = AutoIncrementPlan::default();
        if rows.is_empty() {
            return Ok(plan);
        }

        let dialect = connection.dialect();
        let table_sql = dialect.qualified_table(schema.schema(), schema.name());

        for column in Self::needed_columns(schema, rows) {
            let sql = dialect.max_value_query(&table_sql, &dialect.quote_identifier(&column.name));
            let result = connection.query(&sql, &[]).await?;
            let max = match result.scalar() {
                None | Some(Value::Null) => 0,
                Some(value) => value.as_i64().ok_or_else(|| {
                    ServiceError::TableOperationFailed(format!(
                        "maximum of column {} is not an integer: {}",
                        column.name, value
                    ))
                })?,
            };
            tracing::debug!(column = %column.name, max, "seeded auto-increment");
            plan.next.insert(column.name.clone(), max + 1);
        }

        Ok(plan)
    }

    /// Fill every empty eligible cell of `rows`, in row order.
    ///
    /// Returns the number of cells assigned.
    pub fn apply(plan: &AutoIncrementPlan, rows: &mut [Row]) -> usize {
        let mut next = plan.next.clone();
        let mut assigned = 0;
        for row in rows.iter_mut() {
            for (column, value) in next.iter_mut() {
                if needs_value(row.get_by_name(column)) {
                    row.set(column, Value::Int64(*value));
                    *value += 1;
                    assigned += 1;
                }
            }
        }
        assigned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn employees() -> TableSchema {
        TableSchema::new(
            None,
            "Employees",
            vec![
                ColumnInfo::new("ID", 0, "int")
                    .with_category(TypeCategory::Integer)
                    .not_null(),
                ColumnInfo::new("EmployeeNumber", 1, "int")
                    .with_category(TypeCategory::Integer)
                    .not_null(),
                ColumnInfo::new("Badge", 2, "int").with_category(TypeCategory::Integer),
                ColumnInfo::new("RowId", 3, "bigint")
                    .with_category(TypeCategory::Integer)
                    .identity(),
                ColumnInfo::new("Surname", 4, "nvarchar")
                    .with_category(TypeCategory::Text)
                    .not_null(),
            ],
            vec!["ID".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_eligibility() {
        let schema = employees();
        let eligible: Vec<_> = schema
            .columns()
            .iter()
            .filter(|c| is_eligible(c))
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(eligible, vec!["EmployeeNumber"]);
    }

    #[test]
    fn test_needs_value() {
        assert!(needs_value(None));
        assert!(needs_value(Some(&Value::Null)));
        assert!(needs_value(Some(&Value::Int32(0))));
        assert!(needs_value(Some(&Value::String("  ".into()))));
        assert!(!needs_value(Some(&Value::Int64(5))));
        assert!(!needs_value(Some(&Value::String("7".into()))));
    }

    #[test]
    fn test_apply_assigns_increasing_values() {
        let plan = AutoIncrementPlan {
            next: BTreeMap::from([("EmployeeNumber".to_string(), 42)]),
        };
        let mut rows = vec![
            Row::from_pairs([("EmployeeNumber", Value::Null)]),
            Row::from_pairs([("EmployeeNumber", Value::Int32(100))]),
            Row::from_pairs([("EmployeeNumber", Value::Int32(0))]),
        ];
        assert_eq!(AutoIncrementResolver::apply(&plan, &mut rows), 2);
        assert_eq!(rows[0].get_by_name("EmployeeNumber"), Some(&Value::Int64(42)));
        assert_eq!(rows[1].get_by_name("EmployeeNumber"), Some(&Value::Int32(100)));
        assert_eq!(rows[2].get_by_name("EmployeeNumber"), Some(&Value::Int64(43)));
    }

    #[test]
    fn test_needed_columns_skips_filled_rows() {
        let schema = employees();
        let filled = vec![Row::from_pairs([("EmployeeNumber", Value::Int32(9))])];
        assert!(AutoIncrementResolver::needed_columns(&schema, &filled).is_empty());

        let empty = vec![Row::from_pairs([("Surname", Value::String("Smith".into()))])];
        let needed = AutoIncrementResolver::needed_columns(&schema, &empty);
        assert_eq!(needed.len(), 1);
        assert_eq!(needed[0].name, "EmployeeNumber");
    }
}
