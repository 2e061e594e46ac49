//! Configuration loading for recall.
//!
//! Layered config: defaults -> config file -> env vars.
//! The default config file lives at `<config dir>/recall/config.{toml,yaml,json}`.
//! Environment variables use the `RECALL_` prefix and `__` for nesting,
//! e.g. `RECALL_SEARCH__TOP_K=5`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Largest rounding precision that still means something for an f64.
const MAX_PRECISION: u32 = 15;

/// Search defaults applied when a caller does not pass explicit options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    /// Number of results returned by a search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Decimal digits kept in similarity scores
    #[serde(default = "default_precision")]
    pub precision: u32,
}

fn default_top_k() -> usize {
    3
}

fn default_precision() -> u32 {
    6
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            precision: default_precision(),
        }
    }
}

/// Durable store tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreSettings {
    /// Capacity of the bounded channel behind a reload cursor.
    /// Bounds how many decoded records sit in memory ahead of the consumer.
    #[serde(default = "default_cursor_buffer")]
    pub cursor_buffer: usize,
}

fn default_cursor_buffer() -> usize {
    64
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            cursor_buffer: default_cursor_buffer(),
        }
    }
}

/// Main settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Directory holding one RocksDB instance per named store
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Store name used when none is given explicitly
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Collection name used when none is given explicitly
    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub store: StoreSettings,

    /// Entries kept by the embedding memo cache
    #[serde(default = "default_embedding_cache_capacity")]
    pub embedding_cache_capacity: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> String {
    ProjectDirs::from("", "", "recall")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_db_name() -> String {
    "clientVectorDB".to_string()
}

fn default_collection() -> String {
    "ClientEmbeddingStore".to_string()
}

fn default_embedding_cache_capacity() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_name: default_db_name(),
            collection: default_collection(),
            search: SearchSettings::default(),
            store: StoreSettings::default(),
            embedding_cache_capacity: default_embedding_cache_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Default config file (optional)
    /// 3. Caller-specified config file (required when given)
    /// 4. Environment variables (RECALL_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "recall")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("data_dir", default_data_dir())?
            .set_default("db_name", default_db_name())?
            .set_default("collection", default_collection())?
            .set_default("search.top_k", default_top_k() as i64)?
            .set_default("search.precision", default_precision() as i64)?
            .set_default("store.cursor_buffer", default_cursor_buffer() as i64)?
            .set_default(
                "embedding_cache_capacity",
                default_embedding_cache_capacity() as i64,
            )?
            .set_default("log_level", default_log_level())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("RECALL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values that would make the index or store misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.top_k == 0 {
            return Err(ConfigError::Invalid {
                field: "search.top_k",
                reason: "must be > 0".to_string(),
            });
        }
        if self.search.precision > MAX_PRECISION {
            return Err(ConfigError::Invalid {
                field: "search.precision",
                reason: format!("must be <= {}, got {}", MAX_PRECISION, self.search.precision),
            });
        }
        if self.store.cursor_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "store.cursor_buffer",
                reason: "must be > 0".to_string(),
            });
        }
        if self.embedding_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "embedding_cache_capacity",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Expand a leading `~/` in `data_dir`.
    pub fn expanded_data_dir(&self) -> PathBuf {
        if let Some(rest) = self.data_dir.strip_prefix("~/") {
            if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
                return home.join(rest);
            }
        }
        PathBuf::from(&self.data_dir)
    }
}
