//! Paged query planner
//!
//! Produces the count query and the row-numbered page query for one page of
//! a filtered table. Row order is deterministic: primary-key columns
//! ascending, or every orderable column in ordinal order when the table has
//! no key.

use serde::{Deserialize, Serialize};
use tabler_core::{Dialect, QueryResult, ROW_NUMBER_COLUMN, TableSchema, Value};

use crate::filter_builder::Predicate;

/// Rows per page when nothing else is configured
pub const DEFAULT_PAGE_SIZE: u64 = 15;

/// Largest row number `ROW_NUMBER()` can produce
const MAX_ROW_NUMBER: u64 = i64::MAX as u64;

/// Which page to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    /// Pages below 1 are clamped to 1, a zero page size to 1. The page is
    /// also capped so its last row number still fits a `BIGINT`.
    pub fn new(page: i64, page_size: u64) -> Self {
        let page_size = page_size.clamp(1, MAX_ROW_NUMBER);
        Self {
            page: (page.max(1) as u64).min(MAX_ROW_NUMBER / page_size),
            page_size,
        }
    }

    pub fn first(page_size: u64) -> Self {
        Self::new(1, page_size)
    }

    /// First row of the page, 1-based
    pub fn first_row(&self) -> u64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.page_size)
            .saturating_add(1)
            .min(MAX_ROW_NUMBER)
    }

    /// Last row of the page, inclusive
    pub fn last_row(&self) -> u64 {
        self.page.saturating_mul(self.page_size).min(MAX_ROW_NUMBER)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Statements for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PagePlan {
    pub count_sql: String,
    pub page_sql: String,
    /// Bound to both statements
    pub params: Vec<Value>,
    pub first_row: u64,
    pub last_row: u64,
    /// Columns the page is ordered by, empty when the order is arbitrary
    pub order_by: Vec<String>,
}

/// `ceil(total / page_size)`; an empty result has zero pages
pub fn total_pages(total_records: u64, page_size: u64) -> u64 {
    total_records.div_ceil(page_size.max(1))
}

/// Remove the row-number helper column if a driver returned it
pub fn strip_row_number(result: &mut QueryResult) {
    result.columns.retain(|c| c.name != ROW_NUMBER_COLUMN);
    for row in &mut result.rows {
        row.remove(ROW_NUMBER_COLUMN);
    }
}

pub struct PagePlanner;

impl PagePlanner {
    /// Columns that give the table a deterministic order
    pub fn order_columns(schema: &TableSchema, dialect: &dyn Dialect) -> Vec<String> {
        if schema.has_primary_key() {
            return schema.primary_key().to_vec();
        }
        schema
            .columns()
            .iter()
            .filter(|c| dialect.is_orderable(c))
            .map(|c| c.name.clone())
            .collect()
    }

    /// Plan the count and page queries for `request` under `predicate`
    pub fn plan(
        schema: &TableSchema,
        dialect: &dyn Dialect,
        predicate: &Predicate,
        request: PageRequest,
    ) -> PagePlan {
        let table_sql = dialect.qualified_table(schema.schema(), schema.name());
        let columns_sql = schema
            .column_names()
            .map(|c| dialect.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");

        let order_by = Self::order_columns(schema, dialect);
        let order_sql = if order_by.is_empty() {
            dialect.arbitrary_order().to_string()
        } else {
            order_by
                .iter()
                .map(|c| format!("{} ASC", dialect.quote_identifier(c)))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let where_sql = predicate.clause.as_deref();
        let first_row = request.first_row();
        let last_row = request.last_row();

        let plan = PagePlan {
            count_sql: dialect.count_query(&table_sql, where_sql),
            page_sql: dialect.paged_query(
                &table_sql,
                &columns_sql,
                where_sql,
                &order_sql,
                first_row,
                last_row,
            ),
            params: predicate.values(),
            first_row,
            last_row,
            order_by,
        };
        tracing::debug!(
            table = %schema.name(),
            page = request.page,
            first_row,
            last_row,
            "planned page query"
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tabler_core::{ColumnInfo, GenericDialect, Row, TypeCategory};

    fn schema(keys: Vec<String>) -> TableSchema {
        TableSchema::new(
            Some("dbo".into()),
            "Cars",
            vec![
                ColumnInfo::new("Make", 1, "nvarchar").with_category(TypeCategory::Text),
                ColumnInfo::new("Id", 0, "int").with_category(TypeCategory::Integer),
                ColumnInfo::new("Notes", 2, "ntext").with_category(TypeCategory::Text),
            ],
            keys,
        )
        .unwrap()
    }

    #[test]
    fn test_page_request_bounds() {
        let request = PageRequest::new(3, 15);
        assert_eq!(request.first_row(), 31);
        assert_eq!(request.last_row(), 45);

        let clamped = PageRequest::new(0, 15);
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.first_row(), 1);
        assert_eq!(PageRequest::new(-4, 10).page, 1);
    }

    #[test]
    fn test_extreme_page_does_not_overflow() {
        let request = PageRequest::new(i64::MAX, 15);
        assert_eq!(request.page, i64::MAX as u64 / 15);
        assert!(request.first_row() <= request.last_row());
        assert!(request.last_row() <= i64::MAX as u64);

        let plan = PagePlanner::plan(
            &schema(vec!["Id".into()]),
            &GenericDialect,
            &Predicate::none(),
            request,
        );
        assert_eq!(plan.last_row, request.last_row());

        let huge = PageRequest { page: u64::MAX, page_size: u64::MAX };
        assert_eq!(huge.first_row(), i64::MAX as u64);
        assert_eq!(huge.last_row(), i64::MAX as u64);
        assert_eq!(PageRequest::new(2, u64::MAX).page, 1);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(0, 15), 0);
        assert_eq!(total_pages(15, 15), 1);
        assert_eq!(total_pages(16, 15), 2);
        assert_eq!(total_pages(47, 15), 4);
    }

    #[test]
    fn test_plan_orders_by_primary_key() {
        let plan = PagePlanner::plan(
            &schema(vec!["Id".into()]),
            &GenericDialect,
            &Predicate::none(),
            PageRequest::new(2, 15),
        );
        assert_eq!(plan.count_sql, "SELECT COUNT(*) FROM \"dbo\".\"Cars\"");
        assert_eq!(plan.order_by, vec!["Id".to_string()]);
        assert!(plan.page_sql.contains("ORDER BY \"Id\" ASC"));
        assert!(plan.page_sql.contains("BETWEEN 16 AND 30"));
        assert!(plan.params.is_empty());
    }

    #[test]
    fn test_plan_without_key_orders_by_orderable_columns() {
        let plan = PagePlanner::plan(
            &schema(Vec::new()),
            &GenericDialect,
            &Predicate::none(),
            PageRequest::first(15),
        );
        assert_eq!(plan.order_by, vec!["Id".to_string(), "Make".to_string()]);
        assert!(plan.page_sql.contains("ORDER BY \"Id\" ASC, \"Make\" ASC"));
    }

    #[test]
    fn test_plan_shares_predicate_between_count_and_page() {
        let predicate = Predicate {
            clause: Some("\"Make\" LIKE '%' || ? || '%'".into()),
            params: vec![crate::filter_builder::BoundParameter {
                name: "param_0".into(),
                value: Value::String("Ford".into()),
            }],
        };
        let plan = PagePlanner::plan(
            &schema(vec!["Id".into()]),
            &GenericDialect,
            &predicate,
            PageRequest::first(15),
        );
        assert!(plan.count_sql.ends_with("WHERE \"Make\" LIKE '%' || ? || '%'"));
        assert!(plan.page_sql.contains("WHERE \"Make\" LIKE '%' || ? || '%'"));
        assert_eq!(plan.params, vec![Value::String("Ford".into())]);
    }

    #[test]
    fn test_strip_row_number() {
        let mut result = QueryResult::empty();
        result.rows.push(Row::from_pairs([
            ("Id", Value::Int32(1)),
            (ROW_NUMBER_COLUMN, Value::Int64(1)),
        ]));
        strip_row_number(&mut result);
        assert_eq!(result.rows[0].columns(), &["Id".to_string()]);
    }
}
