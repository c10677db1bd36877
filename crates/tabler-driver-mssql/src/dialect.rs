//! T-SQL dialect implementation for MS SQL Server
//!
//! Square-bracket identifiers, `@Pn` positional parameters (the only form
//! tiberius binds), `+` string concatenation and `ISNULL` for the
//! auto-increment seed.

use tabler_core::{ColumnInfo, Dialect, Result, TablerError, TypeCategory, sized_type_sql};

/// T-SQL dialect implementation for MS SQL Server
///
/// # Example
///
/// ```
/// use tabler_core::Dialect;
/// use tabler_driver_mssql::MssqlDialect;
///
/// let dialect = MssqlDialect::new();
/// assert_eq!(dialect.quote_identifier("Cars"), "[Cars]");
/// assert_eq!(dialect.placeholder(2), "@P2");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new MS SQL Server dialect instance
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn id(&self) -> &'static str {
        "mssql"
    }

    /// Closing brackets inside the identifier are doubled
    ///
    /// ```
    /// use tabler_core::Dialect;
    /// use tabler_driver_mssql::MssqlDialect;
    ///
    /// assert_eq!(MssqlDialect.quote_identifier("user[data]"), "[user[data]]]");
    /// ```
    fn quote_identifier(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn placeholder(&self, position: usize) -> String {
        format!("@P{}", position)
    }

    fn type_category(&self, declared: &str) -> TypeCategory {
        let base = declared.split('(').next().unwrap_or_default().trim();
        if base.eq_ignore_ascii_case("sysname") {
            return TypeCategory::Text;
        }
        TypeCategory::from_declared(declared)
    }

    fn contains_predicate(&self, column_sql: &str, placeholder: &str) -> String {
        format!("{} LIKE '%' + {} + '%'", column_sql, placeholder)
    }

    fn cast_to_text(&self, column_sql: &str) -> String {
        format!("CONVERT(NVARCHAR(MAX), {})", column_sql)
    }

    fn max_value_query(&self, table_sql: &str, column_sql: &str) -> String {
        format!("SELECT ISNULL(MAX({}), 0) FROM {}", column_sql, table_sql)
    }

    fn column_type_sql(&self, column: &ColumnInfo) -> Option<String> {
        let base = column.data_type.trim();
        let lower = base.to_ascii_lowercase();
        match (lower.as_str(), column.max_length) {
            ("varchar" | "nvarchar" | "varbinary", Some(-1)) => Some(format!("{}(MAX)", base)),
            ("binary" | "varbinary", Some(len)) if len > 0 => Some(format!("{}({})", base, len)),
            _ => sized_type_sql(column),
        }
    }

    fn set_not_null_ddl(&self, table_sql: &str, column: &ColumnInfo) -> Result<String> {
        let declared = self.column_type_sql(column).ok_or_else(|| {
            TablerError::Schema(format!(
                "declared type of column '{}' is unknown",
                column.name
            ))
        })?;
        Ok(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            table_sql,
            self.quote_identifier(&column.name),
            declared
        ))
    }
}
