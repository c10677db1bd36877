//! Database driver trait definition

use crate::{Connection, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Database driver
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "mssql")
    fn id(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str;

    /// Default connection port
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Open a connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Test a connection without keeping it
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.close().await
    }

    /// Build a connection string for display or external tools
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;
}

/// Connection configuration.
///
/// Passed explicitly to drivers; there is no process-wide connection state.
/// A missing username selects integrated authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "mssql")
    pub driver: String,
    /// Host address
    pub host: String,
    /// Port number (0 for the driver default)
    pub port: u16,
    /// Database name
    pub database: Option<String>,
    /// Username
    pub username: Option<String>,
    /// Password
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Additional connection parameters (e.g. `trust_cert`)
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a configuration for `driver` with empty connection fields
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            ..Default::default()
        }
    }

    /// Create a SQL Server configuration
    pub fn new_mssql(host: &str, port: u16, database: Option<&str>) -> Self {
        let mut config = Self::new("mssql");
        config.host = host.to_string();
        config.port = port;
        config.database = database.map(str::to_string);
        config
    }

    /// Use SQL authentication with the given credentials
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = Some(username.to_string());
        self.password = Some(password.to_string());
        self
    }

    /// Same server, different database
    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter (`true`/`1`/`yes`)
    pub fn get_bool(&self, key: &str) -> bool {
        self.params
            .get(key)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false)
    }

    /// True when no SQL login is configured
    pub fn uses_integrated_auth(&self) -> bool {
        self.username.as_deref().is_none_or(str::is_empty)
    }
}
