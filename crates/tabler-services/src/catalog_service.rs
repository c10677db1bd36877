//! Database and table listing

use tabler_core::{Connection, SchemaIntrospection, TableInfo};

use crate::error::{ServiceError, ServiceResult};

/// Lists what can be browsed on a server
pub struct CatalogService;

impl CatalogService {
    fn introspection(connection: &dyn Connection) -> ServiceResult<&dyn SchemaIntrospection> {
        connection
            .as_schema_introspection()
            .ok_or(ServiceError::SchemaNotSupported)
    }

    /// Names of user databases, sorted
    #[tracing::instrument(skip(connection))]
    pub async fn list_databases(connection: &dyn Connection) -> ServiceResult<Vec<String>> {
        let databases = Self::introspection(connection)?
            .list_databases()
            .await
            .map_err(|e| ServiceError::SchemaLoadFailed(e.to_string()))?;

        let mut names: Vec<String> = databases.into_iter().map(|db| db.name).collect();
        names.sort();
        tracing::debug!(count = names.len(), "listed databases");
        Ok(names)
    }

    /// Tables in the connected database, sorted by name
    #[tracing::instrument(skip(connection))]
    pub async fn list_tables(
        connection: &dyn Connection,
        schema: Option<&str>,
    ) -> ServiceResult<Vec<TableInfo>> {
        let mut tables = Self::introspection(connection)?
            .list_tables(schema)
            .await
            .map_err(|e| ServiceError::SchemaLoadFailed(e.to_string()))?;

        tables.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!(count = tables.len(), "listed tables");
        Ok(tables)
    }
}
