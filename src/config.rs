//! Configuration handling
//!
//! Manages the sqlaction.toml configuration file. A missing file means defaults: a
//! `sqlaction.db` database in the working directory and the SQLite dialect.
//!
//! ## Environment Variables
//!
//! The following environment variables can override config file settings:
//!
//! - `SQLACTION_DATABASE` - Database file path
//! - `SQLACTION_DIALECT` - Dialect name used to pick templates
//! - `SQLACTION_FETCH_LIMIT` - Default fetch limit
//!
//! These can be set in a `.env` file next to the configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sqlaction_core::{ActionContext, Capitalization, DialectFeatures, QueryMetadata};

use crate::sqlite::sqlite_features;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "sqlaction.toml";

/// Environment variable names
pub const ENV_DATABASE: &str = "SQLACTION_DATABASE";
pub const ENV_DIALECT: &str = "SQLACTION_DIALECT";
pub const ENV_FETCH_LIMIT: &str = "SQLACTION_FETCH_LIMIT";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub query: QueryConfig,
    /// Dialect capabilities; defaults to what the SQLite driver supports
    #[serde(default = "sqlite_features")]
    pub dialect: DialectFeatures,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("sqlaction.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Defaults applied to every query run from the command line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub fetch_size: usize,
    #[serde(default)]
    pub timeout_secs: u32,
    #[serde(default)]
    pub fetch_offset: usize,
    #[serde(default)]
    pub fetch_limit: usize,
    #[serde(default)]
    pub capitalization: Capitalization,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            query: QueryConfig::default(),
            dialect: sqlite_features(),
        }
    }
}

impl Config {
    /// Load configuration from a directory
    ///
    /// This also loads any `.env` file in the directory and applies
    /// environment variable overrides.
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let env_path = dir.join(".env");
        if env_path.exists() {
            let _ = dotenvy::from_path(&env_path);
        }

        let config_path = dir.join(CONFIG_FILE_NAME);
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!(
                "No {} in {}, using defaults",
                CONFIG_FILE_NAME,
                dir.display()
            );
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration text, without environment overrides
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_DATABASE) {
            if !path.is_empty() {
                self.database.path = PathBuf::from(path);
            }
        }

        if let Ok(dialect) = std::env::var(ENV_DIALECT) {
            if !dialect.is_empty() {
                self.dialect.name = dialect;
            }
        }

        if let Ok(limit) = std::env::var(ENV_FETCH_LIMIT) {
            if let Ok(limit) = limit.parse::<usize>() {
                self.query.fetch_limit = limit;
            }
        }
    }

    /// Query metadata carrying the configured defaults
    pub fn metadata(&self) -> QueryMetadata {
        QueryMetadata::default()
            .with_fetch_size(self.query.fetch_size)
            .with_timeout(self.query.timeout_secs)
            .with_offset(self.query.fetch_offset)
            .with_limit(self.query.fetch_limit)
            .with_capitalization(self.query.capitalization)
    }

    /// Action context for the configured dialect, logging through `tracing`
    pub fn context(&self) -> ActionContext {
        ActionContext::new(self.dialect.clone())
    }
}
