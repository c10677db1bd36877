//! MS SQL Server schema introspection implementation

use async_trait::async_trait;
use tabler_core::{
    ColumnInfo, Connection, DatabaseInfo, Dialect, PrimaryKeyInfo, Result, Row,
    SchemaIntrospection, TableInfo, Value,
};

use super::MssqlConnection;

const DEFAULT_SCHEMA: &str = "dbo";

/// User databases only (`master`, `tempdb`, `model` and `msdb` have ids 1-4)
pub(crate) const LIST_DATABASES_SQL: &str =
    "SELECT name FROM sys.databases WHERE database_id > 4 ORDER BY name";

const LIST_TABLES_SQL: &str = "SELECT
        s.name AS schema_name,
        t.name AS table_name,
        (SELECT SUM(p.rows) FROM sys.partitions p
         WHERE p.object_id = t.object_id AND p.index_id IN (0, 1)) AS row_count
     FROM sys.tables t
     INNER JOIN sys.schemas s ON t.schema_id = s.schema_id";

pub(crate) fn list_tables_sql(filter_schema: bool) -> String {
    if filter_schema {
        format!("{} WHERE s.name = @P1 ORDER BY t.name", LIST_TABLES_SQL)
    } else {
        format!("{} ORDER BY t.name", LIST_TABLES_SQL)
    }
}

/// Character lengths are reported in characters, `-1` for `MAX`
pub(crate) const COLUMNS_SQL: &str = "SELECT
        c.name AS column_name,
        c.column_id AS ordinal,
        TYPE_NAME(c.user_type_id) AS data_type,
        c.is_nullable,
        dc.definition AS default_value,
        CASE
            WHEN c.max_length = -1 THEN -1
            WHEN TYPE_NAME(c.user_type_id) IN ('nchar', 'nvarchar') THEN c.max_length / 2
            ELSE c.max_length
        END AS max_length,
        c.precision,
        c.scale,
        c.is_identity
     FROM sys.columns c
     INNER JOIN sys.tables t ON c.object_id = t.object_id
     INNER JOIN sys.schemas s ON t.schema_id = s.schema_id
     LEFT JOIN sys.default_constraints dc ON c.default_object_id = dc.object_id
     WHERE s.name = @P1 AND t.name = @P2
     ORDER BY c.column_id";

pub(crate) const PRIMARY_KEY_SQL: &str = "SELECT
        kcu.COLUMN_NAME,
        kcu.CONSTRAINT_NAME
     FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
     WHERE OBJECTPROPERTY(
             OBJECT_ID(QUOTENAME(kcu.CONSTRAINT_SCHEMA) + '.' + QUOTENAME(kcu.CONSTRAINT_NAME)),
             'IsPrimaryKey') = 1
       AND kcu.TABLE_SCHEMA = @P1
       AND kcu.TABLE_NAME = @P2
     ORDER BY kcu.ORDINAL_POSITION";

#[async_trait]
impl SchemaIntrospection for MssqlConnection {
    /// List user databases on the SQL Server instance
    #[tracing::instrument(skip(self))]
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let result = self.query(LIST_DATABASES_SQL, &[]).await?;
        Ok(result.rows.iter().filter_map(parse_database_row).collect())
    }

    /// List all tables, optionally restricted to one schema
    #[tracing::instrument(skip(self))]
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>> {
        let result = match schema {
            Some(schema) => {
                self.query(&list_tables_sql(true), &[Value::String(schema.to_string())])
                    .await?
            }
            None => self.query(&list_tables_sql(false), &[]).await?,
        };
        Ok(result.rows.iter().filter_map(parse_table_row).collect())
    }

    /// Get columns for a table
    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self
            .query(
                COLUMNS_SQL,
                &[
                    Value::String(schema.to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        let dialect = self.dialect();
        let columns: Vec<ColumnInfo> = result
            .rows
            .iter()
            .map(|row| parse_column_row(row, dialect))
            .collect();

        tracing::debug!(table = %table, columns = columns.len(), "loaded column metadata");
        Ok(columns)
    }

    /// Get primary key for a table
    #[tracing::instrument(skip(self))]
    async fn get_primary_key(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>> {
        let schema = schema.unwrap_or(DEFAULT_SCHEMA);
        let result = self
            .query(
                PRIMARY_KEY_SQL,
                &[
                    Value::String(schema.to_string()),
                    Value::String(table.to_string()),
                ],
            )
            .await?;

        Ok(parse_primary_key_rows(&result.rows))
    }
}

pub(crate) fn parse_database_row(row: &Row) -> Option<DatabaseInfo> {
    let name = row.get(0).and_then(|v| v.as_str())?;
    Some(DatabaseInfo {
        name: name.to_string(),
    })
}

pub(crate) fn parse_table_row(row: &Row) -> Option<TableInfo> {
    let name = row.get(1).and_then(|v| v.as_str())?;
    Some(TableInfo {
        schema: row.get(0).and_then(|v| v.as_str()).map(str::to_string),
        name: name.to_string(),
        row_count: row.get(2).and_then(|v| v.as_i64()),
    })
}

pub(crate) fn parse_column_row(row: &Row, dialect: &dyn Dialect) -> ColumnInfo {
    let name = row
        .get(0)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let ordinal = row.get(1).and_then(|v| v.as_i64()).unwrap_or(0) as usize;
    let data_type = row
        .get(2)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let category = dialect.type_category(&data_type);

    ColumnInfo {
        name,
        ordinal,
        data_type,
        category,
        nullable: row.get(3).and_then(|v| v.as_bool()).unwrap_or(true),
        default_value: row.get(4).and_then(|v| v.as_str()).map(str::to_string),
        max_length: row.get(5).and_then(|v| v.as_i64()),
        precision: row.get(6).and_then(|v| v.as_i64()).map(|i| i as i32),
        scale: row.get(7).and_then(|v| v.as_i64()).map(|i| i as i32),
        is_primary_key: false,
        is_identity: row.get(8).and_then(|v| v.as_bool()).unwrap_or(false),
    }
}

pub(crate) fn parse_primary_key_rows(rows: &[Row]) -> Option<PrimaryKeyInfo> {
    let columns: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get(0).and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect();
    if columns.is_empty() {
        return None;
    }
    let name = rows
        .first()
        .and_then(|row| row.get(1))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    Some(PrimaryKeyInfo { name, columns })
}
