//! RON configuration for the server

use assay_hub::HubConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Listen address (e.g., "127.0.0.1:3000")
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Database file; in-memory when absent
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// RON seed file applied at startup
    #[serde(default)]
    pub seed: Option<PathBuf>,
    /// Sandbox worker pool
    #[serde(default)]
    pub pool: HubConfig,
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database: None,
            seed: None,
            pool: HubConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_ron(&content)
    }

    /// Parse configuration from RON text
    pub fn from_ron(content: &str) -> Result<Self, ConfigError> {
        ron::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply `ASSAY_POOL_SIZE` and `ASSAY_TIMEOUT_MS` from the environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(size) = lookup("ASSAY_POOL_SIZE") {
            self.pool.size = parse_override("ASSAY_POOL_SIZE", &size)?;
        }
        if let Some(timeout) = lookup("ASSAY_TIMEOUT_MS") {
            self.pool.timeout_ms = parse_override("ASSAY_TIMEOUT_MS", &timeout)?;
        }
        Ok(())
    }

    /// The parsed listen address
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen
            .parse()
            .map_err(|_| ConfigError::Validation(format!("invalid listen address '{}'", self.listen)))
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a number, got '{}'", key, raw)))
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_ron(
            r#"(
                listen: "0.0.0.0:8080",
                database: Some("assay.db"),
                pool: (size: 3, timeout_ms: 250, memory_limit_mb: 16, respawn_on_fault: false),
            )"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 8080);
        assert_eq!(config.database, Some(PathBuf::from("assay.db")));
        assert_eq!(config.pool.pool_size(), 3);
        assert_eq!(config.pool.timeout_ms, 250);
        assert!(!config.pool.respawn_on_fault);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = Config::from_ron("(pool: (timeout_ms: 500))").unwrap();
        assert_eq!(config.listen, "127.0.0.1:3000");
        assert_eq!(config.database, None);
        assert_eq!(config.pool.timeout_ms, 500);
        assert_eq!(config.pool.memory_limit_mb, 64);
        assert!(config.pool.respawn_on_fault);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(|key| match key {
                "ASSAY_POOL_SIZE" => Some("5".into()),
                "ASSAY_TIMEOUT_MS" => Some(" 2000 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.pool.size, 5);
        assert_eq!(config.pool.timeout_ms, 2000);

        let err = config
            .apply_overrides(|key| (key == "ASSAY_POOL_SIZE").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
