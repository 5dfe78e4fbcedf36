//! Configuration for the warehouse gateway
//!
//! Loaded exactly once at startup and shared read-only afterwards.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lower bound for any query timeout, in seconds
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Upper bound for any query timeout, in seconds
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Data store target; the path may instead come from the environment
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub pool: PoolConfig,
}

/// Data store connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the database file
    #[serde(default)]
    pub path: PathBuf,

    /// Name the database is exposed under. Defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    /// Open the store read-only
    /// Default: true
    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// Extra database files attached as additional schemas (schema name → path)
    #[serde(default)]
    pub attach: BTreeMap<String, PathBuf>,
}

/// Per-query defaults
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Default query timeout in seconds
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum rows returned per query
    /// Default: 10000
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Extra time the gateway waits past the store-side timeout before
    /// giving up on a blocked worker
    /// Default: 30
    #[serde(default = "default_deadline_grace")]
    pub deadline_grace_secs: u64,
}

/// Blocking worker pool settings
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    /// Maximum simultaneous blocking store calls
    /// Default: 4
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_read_only() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_rows() -> usize {
    10_000
}

fn default_deadline_grace() -> u64 {
    30
}

fn default_workers() -> usize {
    4
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(PathBuf::new())
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_rows: default_max_rows(),
            deadline_grace_secs: default_deadline_grace(),
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl StoreConfig {
    /// Store settings for a single database file with defaults elsewhere
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            read_only: default_read_only(),
            attach: BTreeMap::new(),
        }
    }

    /// Name the database is exposed under
    pub fn database_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| {
                self.path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "local".to_string())
    }
}

impl GatewayConfig {
    /// Config for one database file with every other setting defaulted
    pub fn for_database(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig::new(path),
            query: QueryConfig::default(),
            pool: PoolConfig::default(),
        }
    }

    /// Load configuration from file and environment
    ///
    /// Looks for a config file in:
    /// 1. `WAREHOUSE_CONFIG_PATH` environment variable
    /// 2. `~/.binks/warehouse.toml`
    ///
    /// A missing file is fine as long as the environment supplies the store
    /// path; `WAREHOUSE_*` variables override file values.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("WAREHOUSE_CONFIG_PATH") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => dirs::home_dir().map(|home| home.join(".binks").join("warehouse.toml")),
        };

        let mut config = match file {
            Some(path) if path.exists() => {
                tracing::info!("Loading config from: {}", path.display());
                Self::from_file(&path)?
            }
            _ => {
                tracing::info!("No config file found, using environment only");
                Self::for_database(PathBuf::new())
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Apply `WAREHOUSE_*` overrides using the given variable lookup
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = var("WAREHOUSE_DATABASE_PATH") {
            self.store.path = PathBuf::from(path);
        }

        if let Some(name) = var("WAREHOUSE_DATABASE_NAME") {
            self.store.name = Some(name);
        }

        if let Some(timeout) = var("WAREHOUSE_TIMEOUT") {
            self.query.timeout_secs = timeout
                .parse()
                .with_context(|| format!("WAREHOUSE_TIMEOUT is not an integer: {timeout}"))?;
        }

        if let Some(rows) = var("WAREHOUSE_MAX_ROWS") {
            self.query.max_rows = rows
                .parse()
                .with_context(|| format!("WAREHOUSE_MAX_ROWS is not an integer: {rows}"))?;
        }

        if let Some(workers) = var("WAREHOUSE_WORKERS") {
            self.pool.workers = workers
                .parse()
                .with_context(|| format!("WAREHOUSE_WORKERS is not an integer: {workers}"))?;
        }

        Ok(())
    }

    /// Reject configurations the gateway cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.store.path.as_os_str().is_empty() {
            bail!("Missing required store path: set WAREHOUSE_DATABASE_PATH or [store].path");
        }

        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.query.timeout_secs) {
            bail!(
                "Default timeout must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS,
                MAX_TIMEOUT_SECS,
                self.query.timeout_secs
            );
        }

        if self.query.max_rows == 0 {
            bail!("max_rows must be at least 1");
        }

        if self.pool.workers == 0 {
            bail!("pool.workers must be at least 1");
        }

        Ok(())
    }
}
