//! `Config`: every run-time knob from SPEC_FULL.md §6, loaded from a TOML
//! file with environment-variable overrides, mirroring the teacher's
//! `dotenvy::dotenv().ok()` + TOML-manifest combination.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::Deserialize;

use crate::errors::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the taxonomy manifest (or archive). Required -- this system
    /// ships no product-specific default taxonomy.
    pub taxonomy: String,

    /// Entry-point path inside a taxonomy archive. Required iff `taxonomy`
    /// points at an archive rather than a bare manifest file.
    #[serde(default)]
    pub archive_path: Option<String>,

    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    #[serde(default)]
    pub duckdb_path: Option<PathBuf>,

    #[serde(default)]
    pub metadata_path: Option<PathBuf>,

    #[serde(default)]
    pub datapackage_path: Option<PathBuf>,

    #[serde(default)]
    pub tables: Option<HashSet<String>>,

    #[serde(default)]
    pub filing_timeout_secs: Option<u64>,
}

fn default_batch_size() -> usize {
    20
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> Result<Config, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sqlite_path.is_none() && self.duckdb_path.is_none() {
            return Err(ConfigError::Invalid(
                "at least one of sqlite_path/duckdb_path must be set".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".to_string()));
        }
        if let Some(workers) = self.workers {
            if workers == 0 {
                return Err(ConfigError::Invalid("workers must be positive".to_string()));
            }
        }
        Ok(())
    }

    /// Resolves the effective worker count, defaulting to one per logical core.
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
    }
}
