//! Configuration management.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/tdms-analytics/config.toml`)
//! 3. User-specified configuration file (`--config`)
//! 4. Environment variables (prefixed with `TDMS_`, sections separated by `__`)
//! 5. Command-line arguments
//!
//! # Environment Variables
//!
//! - `TDMS_STORAGE__CONNECTION` - DuckDB database path (`:memory:` for ephemeral)
//! - `TDMS_STORAGE__POOL_SIZE` - Number of pooled storage connections
//! - `TDMS_INGESTION__CHUNK_ROWS` - Rows per bulk-insert chunk
//! - `TDMS_LOGGING__LEVEL` - Default log level

use crate::error::{Error, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const SYSTEM_CONFIG: &str = "/etc/tdms-analytics/config.toml";

/// Command-line overrides shared by every subcommand
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Storage connection string (DuckDB database path)
    #[arg(long, global = true, env = "TDMS_DATABASE")]
    pub database: Option<String>,

    /// Number of pooled storage connections
    #[arg(long, global = true)]
    pub pool_size: Option<usize>,

    /// Rows per bulk-insert chunk
    #[arg(long, global = true)]
    pub chunk_rows: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

/// Complete service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub storage: StorageConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub query: QueryLimits,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine type; only "duckdb" is built in
    #[serde(default = "default_engine")]
    pub engine: String,
    /// Connection string
    #[serde(default = "default_connection")]
    pub connection: String,
    /// Independent connections to the same database
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Engine-specific options
    #[serde(default)]
    pub options: HashMap<String, String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            connection: default_connection(),
            pool_size: default_pool_size(),
            options: HashMap::new(),
        }
    }
}

/// Bulk-load settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Row-count boundary for one atomic insert
    #[serde(default = "default_chunk_rows")]
    pub chunk_rows: usize,
    /// Concurrent chunk writes; 0 means one per CPU
    #[serde(default)]
    pub workers: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            chunk_rows: default_chunk_rows(),
            workers: 0,
        }
    }
}

impl IngestionConfig {
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}

/// Bounds and defaults for window requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryLimits {
    #[serde(default = "default_points_min")]
    pub points_min: usize,
    #[serde(default = "default_points_max")]
    pub points_max: usize,
    #[serde(default = "default_points")]
    pub default_points: usize,
    #[serde(default = "default_limit_min")]
    pub limit_min: usize,
    #[serde(default = "default_limit_max")]
    pub limit_max: usize,
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            points_min: default_points_min(),
            points_max: default_points_max(),
            default_points: default_points(),
            limit_min: default_limit_min(),
            limit_max: default_limit_max(),
            default_limit: default_limit(),
        }
    }
}

impl QueryLimits {
    pub fn check_points(&self, points: usize) -> Result<usize> {
        check_bound("points", points, self.points_min, self.points_max)
    }

    pub fn check_limit(&self, limit: usize) -> Result<usize> {
        check_bound("limit", limit, self.limit_min, self.limit_max)
    }
}

fn check_bound(name: &str, value: usize, min: usize, max: usize) -> Result<usize> {
    if value < min || value > max {
        return Err(Error::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(value)
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Optional EnvFilter directives, e.g. "tdms_analytics_core=debug"
    #[serde(default)]
    pub filter: Option<String>,
    /// Directory for a log file in addition to stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: None,
            directory: None,
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name(SYSTEM_CONFIG).required(false));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TDMS")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;

        if let Some(database) = &args.database {
            settings.storage.connection = database.clone();
        }
        if let Some(pool_size) = args.pool_size {
            settings.storage.pool_size = pool_size;
        }
        if let Some(chunk_rows) = args.chunk_rows {
            settings.ingestion.chunk_rows = chunk_rows;
        }
        if let Some(level) = &args.log_level {
            settings.logging.level = level.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.pool_size == 0 {
            return Err(Error::Config("storage.pool_size must be at least 1".into()));
        }
        if self.ingestion.chunk_rows == 0 {
            return Err(Error::Config("ingestion.chunk_rows must be at least 1".into()));
        }
        let q = &self.query;
        if q.points_min > q.points_max || q.limit_min > q.limit_max {
            return Err(Error::Config("query bounds: min exceeds max".into()));
        }
        if q.check_points(q.default_points).is_err() || q.check_limit(q.default_limit).is_err() {
            return Err(Error::Config("query defaults fall outside their bounds".into()));
        }
        Ok(())
    }
}

fn default_engine() -> String {
    "duckdb".to_string()
}

fn default_connection() -> String {
    ":memory:".to_string()
}

fn default_pool_size() -> usize {
    1
}

fn default_chunk_rows() -> usize {
    1_000_000
}

fn default_points_min() -> usize {
    10
}

fn default_points_max() -> usize {
    20_000
}

fn default_points() -> usize {
    2_000
}

fn default_limit_min() -> usize {
    10_000
}

fn default_limit_max() -> usize {
    200_000
}

fn default_limit() -> usize {
    50_000
}

fn default_log_level() -> String {
    "info".to_string()
}
