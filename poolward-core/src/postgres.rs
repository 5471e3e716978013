//! PostgreSQL backend built on sqlx's `PgPool`.
//!
//! Pools are built lazily (`connect_lazy_with`) so construction never touches
//! the network. The health probe opens one connection of its own, outside the
//! pool, so a refused or failing connect is reported once instead of being
//! retried until the pool's acquire timeout.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres};

use crate::backend::{CheckoutError, PoolBackend, PoolStats};
use crate::config::{DatabaseConfig, EngineOptions};
use crate::error::{BoxError, Result};

/// Engine option keys consumed by the pool itself. Everything else is sent to
/// the server as a run-time parameter on each new connection.
const POOL_KNOBS: &[&str] = &[
    "min_connections",
    "max_overflow",
    "acquire_timeout_ms",
    "idle_timeout_ms",
    "max_lifetime_ms",
    "test_before_acquire",
];

/// Probe statement; must return exactly `1`
const PROBE_SQL: &str = "SELECT 1";

/// `SET application_name` cannot take a bind parameter, `set_config` can.
const SET_LABEL_SQL: &str = "SELECT set_config('application_name', $1, false)";

#[derive(Debug, Clone, Copy, Default)]
pub struct PgBackend;

impl PgBackend {
    pub fn new() -> Self {
        Self
    }

    /// Translate config and engine options into sqlx builders.
    pub fn pool_options(
        config: &DatabaseConfig,
        options: &EngineOptions,
    ) -> Result<(PgPoolOptions, PgConnectOptions)> {
        let overflow = options.get_u32("max_overflow")?.unwrap_or(0);
        let max_connections = config.pool_size.get().saturating_add(overflow);

        let mut pool = PgPoolOptions::new().max_connections(max_connections);
        if let Some(min) = options.get_u32("min_connections")? {
            pool = pool.min_connections(min.min(max_connections));
        }
        if let Some(timeout) = options.get_millis("acquire_timeout_ms")? {
            pool = pool.acquire_timeout(timeout);
        }
        if let Some(timeout) = options.get_millis("idle_timeout_ms")? {
            pool = pool.idle_timeout(timeout);
        }
        if let Some(lifetime) = options.get_millis("max_lifetime_ms")? {
            pool = pool.max_lifetime(lifetime);
        }
        if let Some(test) = options.get_bool("test_before_acquire")? {
            pool = pool.test_before_acquire(test);
        }

        let server_params: Vec<(String, String)> = options
            .iter()
            .filter(|(key, _)| !POOL_KNOBS.contains(key))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        let mut connect = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database);
        if !config.password.is_empty() {
            connect = connect.password(&config.password);
        }
        if !server_params.is_empty() {
            connect = connect.options(server_params);
        }

        Ok((pool, connect))
    }
}

#[async_trait]
impl PoolBackend for PgBackend {
    type Pool = PgPool;
    type Connection = PoolConnection<Postgres>;

    async fn create(
        &self,
        config: &DatabaseConfig,
        options: &EngineOptions,
    ) -> std::result::Result<PgPool, BoxError> {
        let (pool, connect) = Self::pool_options(config, options)?;
        Ok(pool.connect_lazy_with(connect))
    }

    async fn probe(&self, pool: &PgPool) -> std::result::Result<(), BoxError> {
        let limit = pool.options().get_acquire_timeout();
        let connect = pool.connect_options();

        let attempt = async {
            let mut conn = PgConnection::connect_with(&connect).await?;
            let value: i32 = sqlx::query_scalar(PROBE_SQL).fetch_one(&mut conn).await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(value)
        };
        let value = tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| format!("no answer from server within {}ms", limit.as_millis()))??;

        if value != 1 {
            return Err(format!("probe returned {} instead of 1", value).into());
        }
        Ok(())
    }

    async fn checkout(
        &self,
        pool: &PgPool,
    ) -> std::result::Result<PoolConnection<Postgres>, CheckoutError> {
        pool.acquire().await.map_err(|err| match err {
            sqlx::Error::PoolTimedOut => {
                CheckoutError::TimedOut(Some(pool.options().get_acquire_timeout()))
            }
            other => CheckoutError::Failed(Box::new(other)),
        })
    }

    async fn set_session_label(
        &self,
        conn: &mut PoolConnection<Postgres>,
        label: &str,
    ) -> std::result::Result<(), BoxError> {
        // Autocommits: a lease is never inside a transaction at this point.
        sqlx::query(SET_LABEL_SQL)
            .bind(label)
            .execute(&mut **conn)
            .await?;
        Ok(())
    }

    async fn dispose(&self, pool: &PgPool) -> std::result::Result<(), BoxError> {
        pool.close().await;
        Ok(())
    }

    fn stats(&self, pool: &PgPool) -> PoolStats {
        PoolStats {
            open: pool.size(),
            idle: u32::try_from(pool.num_idle()).unwrap_or(u32::MAX),
        }
    }
}
