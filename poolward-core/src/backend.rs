//! Pool backend abstraction
//!
//! The manager owns lifecycle and locking; a backend only knows how to build,
//! validate, lend from, and close one pool for a particular driver.
//! `PgBackend` is the production implementation.

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{DatabaseConfig, EngineOptions};
use crate::error::BoxError;

/// Why a checkout did not produce a connection
#[derive(Debug)]
pub enum CheckoutError {
    /// The pool's own acquire timeout elapsed
    TimedOut(Option<Duration>),
    /// Anything else (pool closed, I/O failure)
    Failed(BoxError),
}

/// Size counters reported by a live pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Connections currently open, idle or leased
    pub open: u32,
    /// Open connections not leased out
    pub idle: u32,
}

/// Driver-specific pool operations.
///
/// Connections handed out by `checkout` must return themselves to their pool
/// when dropped.
#[async_trait]
pub trait PoolBackend: Send + Sync + 'static {
    type Pool: Send + Sync + 'static;
    type Connection: Send + 'static;

    /// Build a pool object. Must not require the database to be reachable.
    async fn create(
        &self,
        config: &DatabaseConfig,
        options: &EngineOptions,
    ) -> Result<Self::Pool, BoxError>;

    /// Minimal round-trip proving the pool can reach and log into the database.
    async fn probe(&self, pool: &Self::Pool) -> Result<(), BoxError>;

    async fn checkout(&self, pool: &Self::Pool) -> Result<Self::Connection, CheckoutError>;

    /// Attach a server-visible label to the session behind `conn`.
    async fn set_session_label(
        &self,
        conn: &mut Self::Connection,
        label: &str,
    ) -> Result<(), BoxError>;

    /// Close the pool. Resolves once every connection, leased ones included,
    /// has been closed.
    async fn dispose(&self, pool: &Self::Pool) -> Result<(), BoxError>;

    fn stats(&self, pool: &Self::Pool) -> PoolStats;
}
