//! Client configuration
//!
//! Settings are layered: built-in defaults, then an optional JSON or TOML
//! file, then `DOCSTORE_*` environment variables, with `__` separating
//! nested keys (`DOCSTORE_CONNECTION__PORT=19531`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::logging::LoggingConfig;
use crate::vector::{
    ConnectionConfig, IndexParams, PoolError, SearchParams, StoreConfig, WorkerPool,
    DEFAULT_WORKERS, MAX_IVF_PARAM, MAX_TOP_K,
};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DOCSTORE";

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("Invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Config save failed: {reason}")]
    SaveFailed { reason: String },
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Concurrent insert/search tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl PoolConfig {
    pub fn build(&self) -> Result<WorkerPool, PoolError> {
        WorkerPool::new(self.workers)
    }
}

/// Everything a document store client needs at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub index: IndexParams,

    #[serde(default)]
    pub search: SearchParams,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Snapshot directory for the in-process service; memory only if unset
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Load defaults, an optional file, then the environment
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator(ENV_SEPARATOR)
                .try_parsing(true),
        );

        let loaded: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the store cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &str, value: String| ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        };

        if self.connection.host.trim().is_empty() {
            return Err(invalid("connection.host", format!("{:?}", self.connection.host)));
        }
        if self.connection.retries == 0 {
            return Err(invalid("connection.retries", "0".to_string()));
        }
        if self.connection.timeout_secs == 0 {
            return Err(invalid("connection.timeout_secs", "0".to_string()));
        }
        if self.index.nlist == 0 || self.index.nlist > MAX_IVF_PARAM {
            return Err(invalid("index.nlist", self.index.nlist.to_string()));
        }
        if self.search.nprobe == 0 || self.search.nprobe > MAX_IVF_PARAM {
            return Err(invalid("search.nprobe", self.search.nprobe.to_string()));
        }
        if self.search.default_limit == 0 || self.search.default_limit > MAX_TOP_K {
            return Err(invalid(
                "search.default_limit",
                self.search.default_limit.to_string(),
            ));
        }
        if self.search.metric != self.index.metric {
            return Err(invalid(
                "search.metric",
                format!("{} (index uses {})", self.search.metric, self.index.metric),
            ));
        }
        if self.pool.workers == 0 {
            return Err(invalid("pool.workers", "0".to_string()));
        }
        Ok(())
    }

    /// Settings handed to [`crate::vector::DocumentStore`]
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_connection(self.connection.clone())
            .with_index(self.index.clone())
            .with_search(self.search.clone())
    }

    /// Write as pretty JSON via temp file + rename
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let save_failed = |reason: String| ConfigError::SaveFailed { reason };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| save_failed(format!("{:?}: {}", parent, e)))?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .and_then(|_| std::fs::rename(&tmp, path))
            .map_err(|e| save_failed(format!("{:?}: {}", path, e)))
    }

    pub fn with_connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_search(mut self, search: SearchParams) -> Self {
        self.search = search;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool.workers = workers;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = Some(dir);
        self
    }
}

/// Default location of the client config file
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vector-docstore")
        .join("config.json")
}
