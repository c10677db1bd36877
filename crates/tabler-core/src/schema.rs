//! Schema introspection trait and table metadata

use crate::{Result, TablerError, TypeCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Catalog access for a connection
#[async_trait]
pub trait SchemaIntrospection: Send + Sync {
    /// List user databases on the server
    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>>;

    /// List all tables in a schema (or every schema when `None`)
    async fn list_tables(&self, schema: Option<&str>) -> Result<Vec<TableInfo>>;

    /// Get columns for a table, in ordinal order.
    ///
    /// Returns an empty list when the table does not exist.
    async fn get_columns(&self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Get primary key for a table
    async fn get_primary_key(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> Result<Option<PrimaryKeyInfo>>;
}

/// Database information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
}

/// Table information (basic)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableInfo {
    pub schema: Option<String>,
    pub name: String,
    pub row_count: Option<i64>,
}

/// Column information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub ordinal: usize,
    /// Declared type as reported by the catalog (e.g. `nvarchar`)
    pub data_type: String,
    pub category: TypeCategory,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub max_length: Option<i64>,
    pub precision: Option<i32>,
    pub scale: Option<i32>,
    pub is_primary_key: bool,
    /// Server-generated value (SQL Server `IDENTITY`)
    pub is_identity: bool,
}

impl ColumnInfo {
    /// A nullable, non-key column with no size information
    pub fn new(name: impl Into<String>, ordinal: usize, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordinal,
            data_type: data_type.into(),
            category: TypeCategory::Other,
            nullable: true,
            default_value: None,
            max_length: None,
            precision: None,
            scale: None,
            is_primary_key: false,
            is_identity: false,
        }
    }

    pub fn with_category(mut self, category: TypeCategory) -> Self {
        self.category = category;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// True when the server supplies a value if the insert omits the column
    pub fn has_server_value(&self) -> bool {
        self.is_identity || self.default_value.is_some()
    }
}

/// Primary key information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKeyInfo {
    pub name: Option<String>,
    pub columns: Vec<String>,
}

/// Everything the editor needs to know about one table.
///
/// Primary-key columns are always a subset of `columns`. An empty key set is
/// valid: reads work, but updates and deletes need a key selection first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    schema: Option<String>,
    name: String,
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
}

impl TableSchema {
    /// Build a schema, checking that every key column exists.
    ///
    /// Columns are sorted by ordinal and each column's `is_primary_key` flag is
    /// synchronized with the key list.
    pub fn new(
        schema: Option<String>,
        name: impl Into<String>,
        mut columns: Vec<ColumnInfo>,
        primary_key: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        columns.sort_by_key(|c| c.ordinal);

        let mut resolved = Vec::with_capacity(primary_key.len());
        for key in &primary_key {
            let column = columns
                .iter()
                .find(|c| c.name == *key)
                .or_else(|| columns.iter().find(|c| c.name.eq_ignore_ascii_case(key)))
                .ok_or_else(|| {
                    TablerError::Schema(format!(
                        "primary key column '{}' is not a column of '{}'",
                        key, name
                    ))
                })?;
            if !resolved.contains(&column.name) {
                resolved.push(column.name.clone());
            }
        }

        for column in &mut columns {
            column.is_primary_key = resolved.contains(&column.name);
        }

        Ok(Self {
            schema,
            name,
            columns,
            primary_key: resolved,
        })
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a column, exact name first, then ignoring ASCII case
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }

    /// Resolve a caller-supplied identifier to the column it names.
    ///
    /// Identifiers end up interpolated (quoted) into SQL, so anything that is
    /// not a known column is rejected.
    pub fn validate_identifier(&self, name: &str) -> Result<&ColumnInfo> {
        self.column(name)
            .ok_or_else(|| TablerError::InvalidIdentifier(format!("{}.{}", self.name, name)))
    }

    pub fn identity_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns.iter().filter(|c| c.is_identity)
    }

    /// A copy of this schema that uses `keys` as its row identity
    pub fn with_key_columns(&self, keys: &[String]) -> Result<Self> {
        Self::new(
            self.schema.clone(),
            self.name.clone(),
            self.columns.clone(),
            keys.to_vec(),
        )
    }

    /// Re-derive every column's category with `categorize`
    pub fn categorize(mut self, categorize: impl Fn(&str) -> TypeCategory) -> Self {
        for column in &mut self.columns {
            column.category = categorize(&column.data_type);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cars() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("Make", 1, "nvarchar"),
            ColumnInfo::new("Id", 0, "int").identity(),
            ColumnInfo::new("Year", 2, "int"),
        ]
    }

    #[test]
    fn new_orders_columns_and_flags_keys() {
        let schema = TableSchema::new(None, "Cars", cars(), vec!["id".into()]).unwrap();
        let names: Vec<_> = schema.column_names().collect();
        assert_eq!(names, vec!["Id", "Make", "Year"]);
        assert_eq!(schema.primary_key(), &["Id".to_string()]);
        assert!(schema.column("Id").unwrap().is_primary_key);
        assert!(!schema.column("Make").unwrap().is_primary_key);
    }

    #[test]
    fn new_rejects_unknown_key_column() {
        let err = TableSchema::new(None, "Cars", cars(), vec!["Vin".into()]).unwrap_err();
        assert!(matches!(err, TablerError::Schema(_)));
    }

    #[test]
    fn empty_key_set_is_valid() {
        let schema = TableSchema::new(None, "Cars", cars(), Vec::new()).unwrap();
        assert!(!schema.has_primary_key());
    }

    #[test]
    fn validate_identifier_rejects_unknown_names() {
        let schema = TableSchema::new(None, "Cars", cars(), Vec::new()).unwrap();
        assert_eq!(schema.validate_identifier("make").unwrap().name, "Make");
        let err = schema.validate_identifier("Make; DROP TABLE Cars").unwrap_err();
        assert!(matches!(err, TablerError::InvalidIdentifier(_)));
    }

    #[test]
    fn with_key_columns_replaces_identity() {
        let schema = TableSchema::new(None, "Cars", cars(), vec!["Id".into()]).unwrap();
        let rekeyed = schema.with_key_columns(&["Make".into()]).unwrap();
        assert_eq!(rekeyed.primary_key(), &["Make".to_string()]);
        assert!(!rekeyed.column("Id").unwrap().is_primary_key);
    }
}
