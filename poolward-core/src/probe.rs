//! Health probe run against every freshly built pool before it is published.
//!
//! Failure subtypes (DNS, refused, bad password, missing database) are not
//! distinguished here; the driver error travels as the wrapped cause.

use std::time::Instant;
use tracing::{debug, Span};

use crate::backend::PoolBackend;
use crate::error::{PoolError, Result};

pub(crate) async fn validate<B: PoolBackend>(backend: &B, pool: &B::Pool, span: &Span) -> Result<()> {
    let started = Instant::now();
    backend
        .probe(pool)
        .await
        .map_err(|source| PoolError::health_check(source))?;
    debug!(
        parent: span,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "health probe passed"
    );
    Ok(())
}
