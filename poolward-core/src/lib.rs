//! poolward-core: lifecycle management for a PostgreSQL connection pool
//!
//! Builds the pool on first use, validates it with a `SELECT 1` probe before
//! anyone can lease from it, swaps it atomically when settings change, and
//! tears it down idempotently.
//!
//! ```ignore
//! let manager = Arc::new(ConnectionManager::new(config).application_name("svc-A"));
//! let mut lease = manager.acquire().await?;
//! sqlx::query("SELECT now()").execute(&mut **lease).await?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod lease;
pub mod manager;
pub mod postgres;
mod probe;

pub use backend::{CheckoutError, PoolBackend, PoolStats};
pub use config::{
    AppConfig, DatabaseConfig, EngineOptions, LoggingConfig, OptionValue, PoolSettings,
    ShutdownPolicy,
};
pub use error::{BoxError, PoolError, Result};
pub use lease::Lease;
pub use manager::{ConnectionManager, ManagerSettings, ManagerStatus, ManagerUpdate};
pub use postgres::PgBackend;
