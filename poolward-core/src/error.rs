/// Structured error types for poolward-core.
///
/// Uses `thiserror` so callers can match on the failure kind.
/// The binary crate (poolward-cli) wraps these in `anyhow` for reporting.

use std::time::Duration;
use thiserror::Error;

/// Boxed cause carried by backend failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for pool lifecycle operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool object could not be constructed (bad options, resource exhaustion)
    #[error("Failed to create connection pool: {source}")]
    PoolCreation { source: BoxError },

    /// The pool was built but the validation round-trip failed
    #[error("Database health check failed, pool discarded: {source}")]
    HealthCheck { source: BoxError },

    /// No connection became available in time
    #[error("{}", lease_timeout_message(.waited))]
    LeaseTimeout { waited: Option<Duration> },

    /// Setting the session label on a fresh lease failed
    #[error("Failed to set session label '{label}': {source}")]
    Labeling { label: String, source: BoxError },

    /// Checkout failed for a reason other than a timeout
    #[error("Failed to check out a connection: {source}")]
    Checkout { source: BoxError },

    /// Configuration error
    #[error("Configuration error: {reason}")]
    Config { reason: String },
}

/// Result type alias for poolward-core operations
pub type Result<T> = std::result::Result<T, PoolError>;

fn lease_timeout_message(waited: &Option<Duration>) -> String {
    match waited {
        Some(waited) => format!("Timed out after {:?} waiting for a pooled connection", waited),
        None => "Timed out waiting for a pooled connection".to_string(),
    }
}

impl PoolError {
    /// Create a pool creation error
    pub fn pool_creation(source: impl Into<BoxError>) -> Self {
        Self::PoolCreation {
            source: source.into(),
        }
    }

    /// Create a health check error
    pub fn health_check(source: impl Into<BoxError>) -> Self {
        Self::HealthCheck {
            source: source.into(),
        }
    }

    /// Create a labeling error
    pub fn labeling(label: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Labeling {
            label: label.into(),
            source: source.into(),
        }
    }

    /// Create a checkout error
    pub fn checkout(source: impl Into<BoxError>) -> Self {
        Self::Checkout {
            source: source.into(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// True for failures raised while building or validating a pool.
    ///
    /// These are the errors `refresh()` surfaces; the manager is always
    /// Uninitialized afterwards.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::PoolCreation { .. } | Self::HealthCheck { .. })
    }
}
