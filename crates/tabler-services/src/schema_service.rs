//! Schema introspection service with caching
//!
//! Describes a table once per selection and keeps the result until it is
//! invalidated (after key promotion or an explicit refresh).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tabler_core::{Connection, TableSchema};

use crate::error::{ServiceError, ServiceResult};

/// A table addressed by database, schema and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            database: None,
            schema: None,
            name: name.into(),
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn in_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for part in [&self.database, &self.schema].into_iter().flatten() {
            write!(f, "{}.", part)?;
        }
        write!(f, "{}", self.name)
    }
}

/// Service for schema introspection operations
pub struct SchemaService {
    cache: RwLock<HashMap<TableRef, TableSchema>>,
}

impl SchemaService {
    /// Create a new schema service
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Describe a table: columns, declared types, nullability, identity and
    /// primary key.
    ///
    /// Cached per [`TableRef`]. Fails with `TableNotFound` when the catalog
    /// has no columns for the table.
    #[tracing::instrument(skip(self, connection), fields(table = %table))]
    pub async fn describe(
        &self,
        connection: &dyn Connection,
        table: &TableRef,
    ) -> ServiceResult<TableSchema> {
        if let Some(cached) = self.cache.read().get(table) {
            tracing::debug!("schema cache hit");
            return Ok(cached.clone());
        }

        let introspection = connection
            .as_schema_introspection()
            .ok_or(ServiceError::SchemaNotSupported)?;

        let columns = introspection
            .get_columns(table.schema.as_deref(), &table.name)
            .await
            .map_err(|e| ServiceError::SchemaLoadFailed(e.to_string()))?;

        if columns.is_empty() {
            return Err(ServiceError::TableNotFound(table.to_string()));
        }

        let primary_key = introspection
            .get_primary_key(table.schema.as_deref(), &table.name)
            .await
            .map_err(|e| ServiceError::SchemaLoadFailed(e.to_string()))?
            .map(|pk| pk.columns)
            .unwrap_or_default();

        let dialect = connection.dialect();
        let schema = TableSchema::new(table.schema.clone(), table.name.clone(), columns, primary_key)
            .map_err(|e| ServiceError::SchemaLoadFailed(e.to_string()))?
            .categorize(|declared| dialect.type_category(declared));

        tracing::info!(
            columns = schema.columns().len(),
            primary_key = ?schema.primary_key(),
            identity = schema.identity_columns().count(),
            "described table"
        );

        self.cache.write().insert(table.clone(), schema.clone());
        Ok(schema)
    }

    /// Drop the cached description of one table
    pub fn invalidate(&self, table: &TableRef) {
        if self.cache.write().remove(table).is_some() {
            tracing::debug!(table = %table, "schema cache invalidated");
        }
    }

    /// Drop every cached description
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn is_cached(&self, table: &TableRef) -> bool {
        self.cache.read().contains_key(table)
    }
}

impl Default for SchemaService {
    fn default() -> Self {
        Self::new()
    }
}
