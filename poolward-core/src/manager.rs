//! Connection pool lifecycle manager
//!
//! # Design
//!
//! - One async mutex (the guard) owns the mutable settings and serialises every
//!   transition: create, dispose, settings swap.
//! - The published pool sits behind a std `RwLock` that is only written while
//!   the guard is held and is never held across an `.await`.
//! - `acquire` checks the published pool without the guard, and only on a miss
//!   takes the guard and checks again before building. The guard is released
//!   before checkout, so warm leases only contend on the pool itself.
//! - A pool is published after its health probe passes and never before.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Span};

use crate::backend::{CheckoutError, PoolBackend};
use crate::config::{AppConfig, DatabaseConfig, EngineOptions, ShutdownPolicy};
use crate::error::{PoolError, Result};
use crate::lease::Lease;
use crate::postgres::PgBackend;
use crate::probe;

/// Everything the manager needs to build a pool.
///
/// Replaced field by field through [`ManagerUpdate`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub config: DatabaseConfig,
    pub engine_options: EngineOptions,
    pub application_name: Option<String>,
    pub shutdown_policy: ShutdownPolicy,
    /// Parent span for every event the manager emits
    pub span: Span,
}

impl ManagerSettings {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            engine_options: EngineOptions::default(),
            application_name: None,
            shutdown_policy: ShutdownPolicy::default(),
            span: info_span!("connection_manager"),
        }
    }

    /// Overwrite the fields present in `update`, keep the rest.
    pub fn merge(&mut self, update: ManagerUpdate) {
        if let Some(config) = update.config {
            self.config = config;
        }
        if let Some(span) = update.span {
            self.span = span;
        }
        if let Some(name) = update.application_name {
            self.application_name = Some(name);
        }
        if let Some(options) = update.engine_options {
            self.engine_options = options;
        }
        if let Some(policy) = update.shutdown_policy {
            self.shutdown_policy = policy;
        }
    }
}

impl From<&AppConfig> for ManagerSettings {
    fn from(app: &AppConfig) -> Self {
        Self {
            config: app.database.clone(),
            engine_options: app.pool.engine_options.clone(),
            application_name: app.pool.application_name.clone(),
            shutdown_policy: app.pool.shutdown_policy,
            span: info_span!("connection_manager", database = %app.database.database),
        }
    }
}

/// Partial override for [`ConnectionManager::update`].
///
/// `None` means "keep the current value".
#[derive(Debug, Clone, Default)]
pub struct ManagerUpdate {
    pub config: Option<DatabaseConfig>,
    pub span: Option<Span>,
    pub application_name: Option<String>,
    pub engine_options: Option<EngineOptions>,
    pub shutdown_policy: Option<ShutdownPolicy>,
}

impl ManagerUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: DatabaseConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    pub fn engine_options(mut self, options: EngineOptions) -> Self {
        self.engine_options = Some(options);
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = Some(policy);
        self
    }
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub ready: bool,
    /// Number of pools successfully published so far
    pub generation: u64,
    pub open_connections: u32,
    pub idle_connections: u32,
}

/// A validated pool plus the per-pool settings leases need
struct LivePool<P> {
    pool: P,
    label: Option<Arc<str>>,
    span: Span,
    generation: u64,
}

/// Owns at most one database pool and hands out leases from it.
///
/// Share it with `Arc`; every method takes `&self`.
pub struct ConnectionManager<B: PoolBackend = PgBackend> {
    backend: Arc<B>,
    guard: Mutex<ManagerSettings>,
    live: RwLock<Option<Arc<LivePool<B::Pool>>>>,
    generation: AtomicU64,
}

impl ConnectionManager<PgBackend> {
    /// PostgreSQL manager with default options
    pub fn new(config: DatabaseConfig) -> Self {
        Self::with_backend(PgBackend::new(), config)
    }

    pub fn from_app_config(app: &AppConfig) -> Self {
        Self::with_settings(PgBackend::new(), ManagerSettings::from(app))
    }
}

impl<B: PoolBackend> ConnectionManager<B> {
    pub fn with_backend(backend: B, config: DatabaseConfig) -> Self {
        Self::with_settings(backend, ManagerSettings::new(config))
    }

    pub fn with_settings(backend: B, settings: ManagerSettings) -> Self {
        Self {
            backend: Arc::new(backend),
            guard: Mutex::new(settings),
            live: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// Set the session label before the manager is shared
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.guard.get_mut().application_name = Some(name.into());
        self
    }

    pub fn engine_options(mut self, options: EngineOptions) -> Self {
        self.guard.get_mut().engine_options = options;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.guard.get_mut().shutdown_policy = policy;
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.guard.get_mut().span = span;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// True when a validated pool is published. Never blocks.
    pub fn is_ready(&self) -> bool {
        self.published().is_some()
    }

    pub fn status(&self) -> ManagerStatus {
        let live = self.published();
        let stats = live
            .as_ref()
            .map(|live| self.backend.stats(&live.pool))
            .unwrap_or_default();
        ManagerStatus {
            ready: live.is_some(),
            generation: self.generation.load(Ordering::Acquire),
            open_connections: stats.open,
            idle_connections: stats.idle,
        }
    }

    /// Current connection settings
    pub async fn config(&self) -> DatabaseConfig {
        self.guard.lock().await.config.clone()
    }

    /// Copy of all current settings
    pub async fn settings(&self) -> ManagerSettings {
        self.guard.lock().await.clone()
    }

    /// Lease a connection, building the pool first if none is published.
    pub async fn acquire(&self) -> Result<Lease<B::Connection>> {
        let live = match self.published() {
            Some(live) => live,
            None => {
                let settings = self.guard.lock().await;
                // Another caller may have finished building while we waited.
                match self.published() {
                    Some(live) => live,
                    None => self.refresh_locked(&settings).await?,
                }
            }
        };
        self.lease_from(live).await
    }

    /// [`acquire`](Self::acquire) bounded by the caller's patience.
    pub async fn acquire_timeout(&self, patience: Duration) -> Result<Lease<B::Connection>> {
        tokio::time::timeout(patience, self.acquire())
            .await
            .map_err(|_| PoolError::LeaseTimeout {
                waited: Some(patience),
            })?
    }

    /// Dispose any current pool, then build and validate a new one.
    pub async fn refresh(&self) -> Result<()> {
        let settings = self.guard.lock().await;
        self.refresh_locked(&settings).await.map(|_| ())
    }

    /// Merge `update` into the settings. A published pool is rebuilt inside
    /// the same critical section; otherwise nothing is built.
    pub async fn update(&self, update: ManagerUpdate) -> Result<()> {
        let mut settings = self.guard.lock().await;
        let was_ready = self.is_ready();
        settings.merge(update);

        if was_ready {
            self.refresh_locked(&settings).await?;
        } else {
            debug!(parent: &settings.span, "settings updated, pool will be built on first use");
        }
        Ok(())
    }

    /// Unpublish and dispose the pool. Safe to call in any state, any number
    /// of times.
    pub async fn shutdown(&self) {
        if !self.is_ready() {
            return;
        }
        let settings = self.guard.lock().await;
        if self.dispose_published(&settings).await {
            info!(parent: &settings.span, "connection pool shut down");
        }
    }

    fn published(&self) -> Option<Arc<LivePool<B::Pool>>> {
        self.live
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn live_mut(&self) -> RwLockWriteGuard<'_, Option<Arc<LivePool<B::Pool>>>> {
        self.live.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller must hold the guard; `settings` is the guarded value.
    async fn refresh_locked(&self, settings: &ManagerSettings) -> Result<Arc<LivePool<B::Pool>>> {
        self.dispose_published(settings).await;

        let config = &settings.config;
        info!(
            parent: &settings.span,
            max_size = config.pool_size.get(),
            user = %config.user,
            host = %config.host,
            port = config.port,
            database = %config.database,
            "creating postgres connection pool"
        );

        let pool = self
            .backend
            .create(config, &settings.engine_options)
            .await
            .map_err(|source| PoolError::pool_creation(source))?;

        if let Err(err) = probe::validate(&*self.backend, &pool, &settings.span).await {
            warn!(parent: &settings.span, error = %err, "discarding unreachable pool");
            if let Err(dispose_err) = self.backend.dispose(&pool).await {
                warn!(parent: &settings.span, error = %dispose_err, "failed to dispose rejected pool");
            }
            return Err(err);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let live = Arc::new(LivePool {
            pool,
            label: settings.application_name.as_deref().map(Arc::from),
            span: settings.span.clone(),
            generation,
        });
        *self.live_mut() = Some(Arc::clone(&live));

        info!(parent: &settings.span, generation, "connection pool ready");
        Ok(live)
    }

    /// Caller must hold the guard. Returns whether a pool was published.
    async fn dispose_published(&self, settings: &ManagerSettings) -> bool {
        let Some(live) = self.live_mut().take() else {
            return false;
        };

        match settings.shutdown_policy {
            ShutdownPolicy::Drain => {
                debug!(parent: &settings.span, generation = live.generation, "draining pool");
                if let Err(err) = self.backend.dispose(&live.pool).await {
                    warn!(parent: &settings.span, error = %err, "pool disposal failed");
                }
            }
            ShutdownPolicy::Immediate => {
                let backend = Arc::clone(&self.backend);
                tokio::spawn(async move {
                    if let Err(err) = backend.dispose(&live.pool).await {
                        warn!(parent: &live.span, error = %err, "pool disposal failed");
                    }
                });
            }
        }
        true
    }

    async fn lease_from(&self, live: Arc<LivePool<B::Pool>>) -> Result<Lease<B::Connection>> {
        let started = Instant::now();
        let mut conn = self
            .backend
            .checkout(&live.pool)
            .await
            .map_err(|err| match err {
                CheckoutError::TimedOut(waited) => PoolError::LeaseTimeout { waited },
                CheckoutError::Failed(source) => PoolError::checkout(source),
            })?;

        if let Some(label) = &live.label {
            // On failure `conn` drops here and goes back to the pool unlabeled.
            self.backend
                .set_session_label(&mut conn, label)
                .await
                .map_err(|source| PoolError::labeling(&**label, source))?;
        }

        debug!(
            parent: &live.span,
            generation = live.generation,
            wait_ms = started.elapsed().as_millis() as u64,
            "lease checked out"
        );
        Ok(Lease::new(conn, live.generation, live.span.clone()))
    }
}

impl<B: PoolBackend> std::fmt::Debug for ConnectionManager<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
