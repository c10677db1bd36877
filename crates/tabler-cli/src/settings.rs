//! Tabler settings
//!
//! Stored as JSON at `<config dir>/tabler/settings.json`. Missing fields take
//! their defaults, so a partial file is valid. Command-line flags override
//! whatever is loaded here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tabler_core::ConnectionConfig;
use tabler_services::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TablerSettings {
    pub browse: BrowseSettings,
    pub connection: ConnectionDefaults,
    pub logging: LoggingPreset,
}

impl TablerSettings {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::settings_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {:?}", path))?;
        serde_json::from_str(&content).with_context(|| "Failed to parse settings JSON")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn settings_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Could not find config directory")?;
        Ok(config_dir.join("tabler").join("settings.json"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrowseSettings {
    pub page_size: u64,
    /// Apply the built-in entity profile when a table has one
    pub use_entity_profiles: bool,
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            use_entity_profiles: true,
        }
    }
}

/// Server to use when the command line does not name one.
///
/// Passwords are never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionDefaults {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
    pub trust_cert: bool,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            database: None,
            username: None,
            trust_cert: false,
        }
    }
}

impl ConnectionDefaults {
    pub fn to_config(&self, password: Option<&str>) -> ConnectionConfig {
        let mut config = ConnectionConfig::new_mssql(&self.host, self.port, self.database.as_deref());
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            config = config.with_credentials(username, password.unwrap_or_default());
        }
        if self.trust_cert {
            config = config.with_param("trust_cert", true);
        }
        config
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LoggingPreset {
    /// Verbose console output plus JSON log files
    Development,
    /// JSON log files only
    Production,
    /// Warnings on the console, no files
    #[default]
    Quiet,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let settings = TablerSettings::default();
        assert_eq!(settings.browse.page_size, 15);
        assert_eq!(settings.connection.port, 1433);
        assert_eq!(settings.logging, LoggingPreset::Quiet);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings: TablerSettings =
            serde_json::from_str(r#"{"browse": {"page_size": 50}, "logging": "production"}"#)
                .unwrap();
        assert_eq!(settings.browse.page_size, 50);
        assert!(settings.browse.use_entity_profiles);
        assert_eq!(settings.connection.host, "localhost");
        assert_eq!(settings.logging, LoggingPreset::Production);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir()
            .join(format!("tabler-settings-{}", std::process::id()))
            .join("settings.json");
        let mut settings = TablerSettings::default();
        settings.connection.database = Some("Garage".into());
        settings.save_to(&path).unwrap();

        assert_eq!(TablerSettings::load_from(&path).unwrap(), settings);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = std::env::temp_dir().join("tabler-does-not-exist").join("settings.json");
        assert_eq!(TablerSettings::load_from(&path).unwrap(), TablerSettings::default());
    }

    #[test]
    fn test_connection_config_from_defaults() {
        let defaults = ConnectionDefaults {
            username: Some("sa".into()),
            trust_cert: true,
            ..Default::default()
        };
        let config = defaults.to_config(Some("secret"));
        assert_eq!(config.host, "localhost");
        assert!(!config.uses_integrated_auth());
        assert!(config.get_bool("trust_cert"));

        assert!(ConnectionDefaults::default().to_config(None).uses_integrated_auth());
    }
}
