//! In-memory pool backend for lifecycle tests

#![allow(dead_code)]

use async_trait::async_trait;
use poolward_core::{BoxError, CheckoutError, DatabaseConfig, EngineOptions, PoolBackend, PoolStats};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub struct FakeBackend {
    pub creates: AtomicUsize,
    pub probes: AtomicUsize,
    pub disposes_started: AtomicUsize,
    pub disposes_done: AtomicUsize,
    pub labels_set: AtomicUsize,
    pub reachable: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_label: AtomicBool,
    /// (host, pool_size) of every pool built, in order
    pub built: Mutex<Vec<(String, u32)>>,
    checkout_timeout: Duration,
    build_delay: Duration,
}

pub struct FakePool {
    pub id: usize,
    pub size: u32,
    permits: Arc<Semaphore>,
    closed: AtomicBool,
}

pub struct FakeConn {
    pub pool_id: usize,
    pub label: Option<String>,
    _permit: OwnedSemaphorePermit,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            creates: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            disposes_started: AtomicUsize::new(0),
            disposes_done: AtomicUsize::new(0),
            labels_set: AtomicUsize::new(0),
            reachable: AtomicBool::new(true),
            fail_create: AtomicBool::new(false),
            fail_label: AtomicBool::new(false),
            built: Mutex::new(Vec::new()),
            checkout_timeout: Duration::from_secs(5),
            build_delay: Duration::from_millis(10),
        }
    }

    pub fn checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn unreachable(self) -> Self {
        self.reachable.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn disposes(&self) -> usize {
        self.disposes_done.load(Ordering::SeqCst)
    }

    pub fn built(&self) -> Vec<(String, u32)> {
        self.built.lock().unwrap().clone()
    }
}

#[async_trait]
impl PoolBackend for FakeBackend {
    type Pool = FakePool;
    type Connection = FakeConn;

    async fn create(
        &self,
        config: &DatabaseConfig,
        _options: &EngineOptions,
    ) -> Result<FakePool, BoxError> {
        // Widen the window in which racing callers could double-build.
        tokio::time::sleep(self.build_delay).await;
        let id = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err("resource exhaustion".into());
        }
        let size = config.pool_size.get();
        self.built.lock().unwrap().push((config.host.clone(), size));
        Ok(FakePool {
            id,
            size,
            permits: Arc::new(Semaphore::new(size as usize)),
            closed: AtomicBool::new(false),
        })
    }

    async fn probe(&self, _pool: &FakePool) -> Result<(), BoxError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        Ok(())
    }

    async fn checkout(&self, pool: &FakePool) -> Result<FakeConn, CheckoutError> {
        if pool.closed.load(Ordering::SeqCst) {
            return Err(CheckoutError::Failed("pool closed".into()));
        }
        match tokio::time::timeout(self.checkout_timeout, pool.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(FakeConn {
                pool_id: pool.id,
                label: None,
                _permit: permit,
            }),
            Ok(Err(_)) => Err(CheckoutError::Failed("pool closed".into())),
            Err(_) => Err(CheckoutError::TimedOut(Some(self.checkout_timeout))),
        }
    }

    async fn set_session_label(&self, conn: &mut FakeConn, label: &str) -> Result<(), BoxError> {
        if self.fail_label.load(Ordering::SeqCst) {
            return Err("permission denied to set parameter".into());
        }
        conn.label = Some(label.to_string());
        self.labels_set.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&self, pool: &FakePool) -> Result<(), BoxError> {
        self.disposes_started.fetch_add(1, Ordering::SeqCst);
        pool.closed.store(true, Ordering::SeqCst);
        // Like sqlx: resolve once every leased connection has come back.
        let all = pool.permits.acquire_many(pool.size).await?;
        drop(all);
        pool.permits.close();
        self.disposes_done.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stats(&self, pool: &FakePool) -> PoolStats {
        PoolStats {
            open: pool.size,
            idle: pool.permits.available_permits() as u32,
        }
    }
}

pub fn config(host: &str, pool_size: u32) -> DatabaseConfig {
    DatabaseConfig::new(
        host,
        5432,
        "restorator",
        "s3cret",
        "population",
        NonZeroU32::new(pool_size).unwrap(),
    )
}
