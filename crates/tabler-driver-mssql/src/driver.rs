//! MS SQL Server driver implementation

use async_trait::async_trait;
use std::sync::Arc;
use tabler_core::{Connection, ConnectionConfig, DatabaseDriver, Result};

use crate::connection::{DEFAULT_PORT, MssqlConnection};

/// MS SQL Server database driver
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDriver;

impl MssqlDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DatabaseDriver for MssqlDriver {
    fn id(&self) -> &'static str {
        "mssql"
    }

    fn display_name(&self) -> &'static str {
        "MS SQL Server"
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    #[tracing::instrument(skip(self, config), fields(host = %config.host, database = ?config.database))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        tracing::debug!("connecting to MS SQL Server");
        let connection = MssqlConnection::from_config(config).await?;
        Ok(Arc::new(connection))
    }

    /// `Server=host,port;Database=..;User Id=..;Password=..`, or
    /// `Trusted_Connection=True` when no login is configured
    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = match config.host.trim() {
            "" => "localhost",
            host => host,
        };
        let port = if config.port > 0 {
            config.port
        } else {
            DEFAULT_PORT
        };

        let mut conn_str = format!("Server={},{}", host, port);

        if let Some(db) = &config.database {
            conn_str.push_str(&format!(";Database={}", db));
        }

        match &config.username {
            Some(user) if !config.uses_integrated_auth() => {
                conn_str.push_str(&format!(";User Id={}", user));
                if let Some(p) = &config.password {
                    conn_str.push_str(&format!(";Password={}", p));
                }
            }
            _ => conn_str.push_str(";Trusted_Connection=True"),
        }

        if config.get_bool("trust_cert") {
            conn_str.push_str(";TrustServerCertificate=True");
        }

        conn_str
    }
}
