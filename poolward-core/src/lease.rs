//! Scoped connection lease

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};
use tracing::{debug, Span};

/// A connection borrowed from the managed pool.
///
/// Dereferences to the backend connection. Dropping the lease drops the
/// connection, which hands it back to the pool it came from; this holds for
/// normal return, `?` propagation, panics and cancelled tasks alike.
pub struct Lease<C> {
    conn: C,
    generation: u64,
    leased_at: Instant,
    span: Span,
}

impl<C> Lease<C> {
    pub(crate) fn new(conn: C, generation: u64, span: Span) -> Self {
        Self {
            conn,
            generation,
            leased_at: Instant::now(),
            span,
        }
    }

    /// Generation of the pool this connection belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// How long the lease has been held
    pub fn held_for(&self) -> Duration {
        self.leased_at.elapsed()
    }
}

impl<C> Deref for Lease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for Lease<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C> fmt::Debug for Lease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("generation", &self.generation)
            .field("held_for", &self.held_for())
            .finish_non_exhaustive()
    }
}

impl<C> Drop for Lease<C> {
    fn drop(&mut self) {
        debug!(
            parent: &self.span,
            generation = self.generation,
            held_ms = self.held_for().as_millis() as u64,
            "lease returned"
        );
    }
}
