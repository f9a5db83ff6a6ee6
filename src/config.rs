//! Engine Configuration
//!
//! Loaded from a TOML file at startup. Every field has a default so a missing
//! file, or a file that only sets a couple of keys, still yields a usable config.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory for templates (`npcs/`, `zones/`, ...) and `html/`
    pub data_dir: PathBuf,
    /// sqlx connection string for the quest store
    pub database_url: String,
    /// Default tracing directive, combined with `RUST_LOG`
    pub log_filter: String,
    /// Watch `data_dir/html` and drop cached pages when they change
    pub html_hot_reload: bool,
    pub persistence: PersistenceConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Maximum pooled connections for the sqlite store
    pub max_connections: u32,
    /// Use the in-memory store instead of sqlite (test servers)
    pub in_memory: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_url: "sqlite:scripts.db?mode=rwc".to_string(),
            log_filter: "isometric_scripting=info".to_string(),
            html_hot_reload: cfg!(debug_assertions),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            in_memory: false,
        }
    }
}

impl EngineConfig {
    /// Load the config from `path`, falling back to defaults if it doesn't exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config {:?} not found, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml(&content).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn html_dir(&self) -> PathBuf {
        self.data_dir.join("html")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
data_dir = "/srv/game"

[persistence]
in_memory = true
"#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/srv/game"));
        assert!(config.persistence.in_memory);
        assert_eq!(config.persistence.max_connections, 5);
        assert_eq!(config.log_filter, "isometric_scripting=info");
        assert_eq!(config.html_dir(), PathBuf::from("/srv/game/html"));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = EngineConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "data_dir = 12").unwrap();

        let err = EngineConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
