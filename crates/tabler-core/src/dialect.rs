//! SQL dialect capabilities
//!
//! Everything that differs between SQL engines when generating browse and
//! edit statements lives behind the [`Dialect`] trait: identifier quoting,
//! parameter placeholders, string concatenation for `LIKE` patterns, casts to
//! text, row-numbered paging and the DDL used for key promotion. The services
//! layer never hardcodes engine syntax.

use crate::{ColumnInfo, Result, TablerError};
use serde::{Deserialize, Serialize};

/// Coarse classification of a declared column type.
///
/// Filtering and auto-increment decisions are made on the category, never on
/// the raw type string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCategory {
    Text,
    Integer,
    Decimal,
    Date,
    Boolean,
    Other,
}

impl TypeCategory {
    /// Classify a declared type such as `nvarchar(50)` or `DECIMAL(10, 2)`
    pub fn from_declared(declared: &str) -> Self {
        let base = declared
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match base.as_str() {
            "char" | "varchar" | "nchar" | "nvarchar" | "text" | "ntext" | "character"
            | "character varying" | "clob" => TypeCategory::Text,
            "int" | "integer" | "bigint" | "smallint" | "tinyint" => TypeCategory::Integer,
            "decimal" | "numeric" | "float" | "real" | "money" | "smallmoney" | "double"
            | "double precision" => TypeCategory::Decimal,
            "date" | "datetime" | "datetime2" | "smalldatetime" => TypeCategory::Date,
            "bit" | "bool" | "boolean" => TypeCategory::Boolean,
            _ => TypeCategory::Other,
        }
    }
}

impl std::fmt::Display for TypeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeCategory::Text => "text",
            TypeCategory::Integer => "integer",
            TypeCategory::Decimal => "decimal",
            TypeCategory::Date => "date",
            TypeCategory::Boolean => "boolean",
            TypeCategory::Other => "other",
        };
        f.write_str(name)
    }
}

/// Name of the synthetic row-number column used by paged queries
pub const ROW_NUMBER_COLUMN: &str = "__row_num";

/// SQL syntax capabilities of one engine
pub trait Dialect: Send + Sync + std::fmt::Debug {
    /// Short identifier (e.g. "mssql", "generic")
    fn id(&self) -> &'static str;

    /// Quote an identifier, escaping the closing delimiter
    fn quote_identifier(&self, ident: &str) -> String;

    /// `schema.table` (or just `table`), both parts quoted
    fn qualified_table(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) if !schema.is_empty() => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
            _ => self.quote_identifier(table),
        }
    }

    /// Placeholder for the bound parameter at 1-based `position`
    fn placeholder(&self, position: usize) -> String;

    /// Map a declared column type to its category
    fn type_category(&self, declared: &str) -> TypeCategory {
        TypeCategory::from_declared(declared)
    }

    /// `column LIKE '%' + param + '%'` in this engine's concatenation syntax
    fn contains_predicate(&self, column_sql: &str, placeholder: &str) -> String;

    /// Convert an arbitrary column to text so it can be matched with `LIKE`
    fn cast_to_text(&self, column_sql: &str) -> String;

    /// Whether the column may appear in an `ORDER BY`
    fn is_orderable(&self, column: &ColumnInfo) -> bool {
        let base = column.data_type.split('(').next().unwrap_or_default().trim();
        !["text", "ntext", "image", "xml", "geography", "geometry"]
            .iter()
            .any(|t| base.eq_ignore_ascii_case(t))
    }

    /// Ordering expression used when no column can be ordered on
    fn arbitrary_order(&self) -> &'static str {
        "(SELECT NULL)"
    }

    /// `SELECT COUNT(*)` over the table under an optional predicate
    fn count_query(&self, table_sql: &str, where_sql: Option<&str>) -> String {
        match where_sql {
            Some(clause) => format!("SELECT COUNT(*) FROM {} WHERE {}", table_sql, clause),
            None => format!("SELECT COUNT(*) FROM {}", table_sql),
        }
    }

    /// Rows `first_row..=last_row` (1-based) of the ordered, filtered table.
    ///
    /// The default wraps the filtered select in a `ROW_NUMBER()` window and
    /// projects only `columns_sql` in the outer query, so the row-number
    /// column never reaches the caller.
    fn paged_query(
        &self,
        table_sql: &str,
        columns_sql: &str,
        where_sql: Option<&str>,
        order_sql: &str,
        first_row: u64,
        last_row: u64,
    ) -> String {
        let row_num = self.quote_identifier(ROW_NUMBER_COLUMN);
        let filter = where_sql
            .map(|clause| format!(" WHERE {}", clause))
            .unwrap_or_default();
        format!(
            "SELECT {cols} FROM (SELECT {cols}, ROW_NUMBER() OVER (ORDER BY {order}) AS {rn} \
             FROM {table}{filter}) AS paged WHERE {rn} BETWEEN {first} AND {last} ORDER BY {rn}",
            cols = columns_sql,
            order = order_sql,
            rn = row_num,
            table = table_sql,
            filter = filter,
            first = first_row,
            last = last_row,
        )
    }

    /// Current maximum of a column, `0` when the table is empty
    fn max_value_query(&self, table_sql: &str, column_sql: &str) -> String;

    /// Declared type in DDL form, e.g. `nvarchar(50)` or `decimal(10,2)`
    fn column_type_sql(&self, column: &ColumnInfo) -> Option<String> {
        sized_type_sql(column)
    }

    /// DDL making `column` non-nullable
    fn set_not_null_ddl(&self, table_sql: &str, column: &ColumnInfo) -> Result<String>;

    /// DDL adding a primary key constraint over already-quoted columns
    fn add_primary_key_ddl(
        &self,
        table_sql: &str,
        constraint_name: &str,
        columns_sql: &[String],
    ) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} PRIMARY KEY ({})",
            table_sql,
            self.quote_identifier(constraint_name),
            columns_sql.join(", ")
        )
    }
}

/// Declared type with length or precision appended where the catalog gave one.
///
/// `max_length` is in characters for text columns; `-1` marks an unbounded
/// `(max)` column.
pub fn sized_type_sql(column: &ColumnInfo) -> Option<String> {
    let base = column.data_type.trim();
    if base.is_empty() {
        return None;
    }
    if base.contains('(') {
        return Some(base.to_string());
    }
    let sized = match (column.category, column.max_length, column.precision) {
        (TypeCategory::Text, Some(-1), _) => format!("{}(max)", base),
        (_, Some(-1), _) if base.eq_ignore_ascii_case("varbinary") => format!("{}(max)", base),
        (TypeCategory::Text, Some(len), _) if len > 0 => format!("{}({})", base, len),
        (TypeCategory::Decimal, _, Some(precision))
            if matches!(base.to_ascii_lowercase().as_str(), "decimal" | "numeric") =>
        {
            format!("{}({},{})", base, precision, column.scale.unwrap_or(0))
        }
        _ => base.to_string(),
    };
    Some(sized)
}

/// ANSI-flavoured dialect: double-quoted identifiers, `?` placeholders and
/// `||` concatenation
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn id(&self) -> &'static str {
        "generic"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn contains_predicate(&self, column_sql: &str, placeholder: &str) -> String {
        format!("{} LIKE '%' || {} || '%'", column_sql, placeholder)
    }

    fn cast_to_text(&self, column_sql: &str) -> String {
        format!("CAST({} AS VARCHAR)", column_sql)
    }

    fn max_value_query(&self, table_sql: &str, column_sql: &str) -> String {
        format!("SELECT COALESCE(MAX({}), 0) FROM {}", column_sql, table_sql)
    }

    fn set_not_null_ddl(&self, table_sql: &str, column: &ColumnInfo) -> Result<String> {
        if column.data_type.trim().is_empty() {
            return Err(TablerError::Schema(format!(
                "declared type of column '{}' is unknown",
                column.name
            )));
        }
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
            table_sql,
            self.quote_identifier(&column.name)
        ))
    }
}
