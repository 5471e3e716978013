//! Tracing setup for the poolward CLI
//!
//! Usage:
//!   poolward --debug ...              # Debug logging to console
//!   RUST_LOG=poolward_core=debug ...  # Fine-grained log control
//!
//! Precedence: RUST_LOG, then --debug, then `[logging] level` from the config.
//!
//! Tracing starts before the config file is read so that config loading is
//! logged too; the configured level is applied afterwards through
//! [`TracingHandle::apply`].

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Enable debug logging (used when RUST_LOG is not set)
    pub debug: bool,
    /// Level from the config file
    pub level: String,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: "info".to_string(),
        }
    }
}

fn filter_for(config: &TracingConfig) -> EnvFilter {
    let fallback = if config.debug {
        "debug"
    } else {
        config.level.as_str()
    };
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Swaps the active filter once the config file has been read
pub struct TracingHandle(reload::Handle<EnvFilter, Registry>);

impl TracingHandle {
    pub fn apply(&self, config: &TracingConfig) -> Result<()> {
        self.0
            .reload(filter_for(config))
            .map_err(|err| anyhow!("failed to apply log level: {}", err))
    }
}

/// Initialize tracing with compact console output on stderr
pub fn init(config: &TracingConfig) -> Result<TracingHandle> {
    let (filter, handle) = reload::Layer::new(filter_for(config));
    let output = fmt::layer()
        .with_target(config.debug) // Show targets in debug mode
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|err| anyhow!(err))?;
    Ok(TracingHandle(handle))
}
