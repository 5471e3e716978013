use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{PoolError, Result};

/// Environment variable naming the config file when no path is passed.
pub const CONFIG_PATH_ENV: &str = "POOLWARD_CONFIG";

const REDACTED: &str = "********";

// ============================================================================
// Database connection settings
// ============================================================================

/// Connection target and sizing for one pool.
///
/// Treated as an immutable snapshot: the manager swaps it wholesale and never
/// edits fields in place. The password never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: NonZeroU32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_database() -> String {
    "postgres".to_string()
}

fn default_pool_size() -> NonZeroU32 {
    NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: String::new(),
            database: default_database(),
            pool_size: default_pool_size(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
        pool_size: NonZeroU32,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            pool_size,
        }
    }

    /// Copy with a different pool size
    pub fn with_pool_size(mut self, pool_size: NonZeroU32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Copy safe to print or serialize for display
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.password.is_empty() {
            copy.password = REDACTED.to_string();
        }
        copy
    }
}

// ============================================================================
// Engine options
// ============================================================================

/// A single backend tuning value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Bool(value) => write!(f, "{}", value),
            OptionValue::Int(value) => write!(f, "{}", value),
            OptionValue::Float(value) => write!(f, "{}", value),
            OptionValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Open-ended backend parameters handed over at pool construction.
///
/// Keys the backend does not recognise are passed through untouched; see
/// `PgBackend` for the PostgreSQL interpretation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineOptions(BTreeMap<String, OptionValue>);

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    /// Non-negative integer option
    pub fn get_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Int(value)) => u32::try_from(*value)
                .map(Some)
                .map_err(|_| invalid_option(key, "a non-negative 32-bit integer")),
            Some(_) => Err(invalid_option(key, "an integer")),
        }
    }

    /// Boolean option
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(invalid_option(key, "a boolean")),
        }
    }

    /// Millisecond duration option
    pub fn get_millis(&self, key: &str) -> Result<Option<Duration>> {
        match self.get(key) {
            None => Ok(None),
            Some(OptionValue::Int(value)) if *value >= 0 => {
                Ok(Some(Duration::from_millis(*value as u64)))
            }
            Some(_) => Err(invalid_option(key, "a non-negative number of milliseconds")),
        }
    }
}

fn invalid_option(key: &str, expected: &str) -> PoolError {
    PoolError::config(format!("engine option '{}' must be {}", key, expected))
}

// ============================================================================
// Shutdown policy
// ============================================================================

/// What disposing a pool does with leases that are still out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Unpublish now, close in the background as leases come back.
    #[default]
    Immediate,
    /// Wait for every outstanding lease to be returned before closing.
    Drain,
}

// ============================================================================
// TOML application configuration
// ============================================================================

/// Whole-process configuration as read from `poolward.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Session label applied to every lease (`application_name`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_name: Option<String>,

    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    #[serde(default, skip_serializing_if = "EngineOptions::is_empty")]
    pub engine_options: EngineOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, else `$POOLWARD_CONFIG`, else defaults, then apply
    /// `.env` and `PG*` environment overrides.
    pub fn from_file_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded .env from {}", path.display());
        }
        config.apply_env_overrides(|key| env::var(key).ok())?;

        Ok(config)
    }

    /// Parse a TOML file without consulting the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PoolError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            PoolError::config(format!("invalid TOML in {}: {}", path.display(), e))
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PoolError::config(format!("invalid TOML: {}", e)))
    }

    /// Apply libpq-style variables (`PGHOST`, `PGPORT`, `PGUSER`,
    /// `PGPASSWORD`, `PGDATABASE`) and `POOLWARD_POOL_SIZE`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db = &mut self.database;

        if let Some(host) = lookup("PGHOST") {
            db.host = host;
        }
        if let Some(port) = lookup("PGPORT") {
            db.port = port
                .parse()
                .map_err(|_| PoolError::config(format!("PGPORT is not a valid port: {}", port)))?;
        }
        if let Some(user) = lookup("PGUSER") {
            db.user = user;
        }
        if let Some(password) = lookup("PGPASSWORD") {
            db.password = password;
        }
        if let Some(database) = lookup("PGDATABASE") {
            db.database = database;
        }
        if let Some(size) = lookup("POOLWARD_POOL_SIZE") {
            db.pool_size = size.parse().map_err(|_| {
                PoolError::config(format!("POOLWARD_POOL_SIZE must be a positive integer: {}", size))
            })?;
        }

        Ok(())
    }

    /// TOML rendering with the password masked
    pub fn to_redacted_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.database = self.database.redacted();
        toml::to_string_pretty(&shown)
            .map_err(|e| PoolError::config(format!("failed to render config: {}", e)))
    }
}
