//! A bounded connection pool over a single [`libsql::Database`].
//!
//! libSQL's `Database` is already a connection factory; this pool only adds
//! the concurrency discipline §4.5 calls for: a semaphore bounding the
//! number of connections in flight, and a single shared WAL-mode database
//! so writers serialize on the store's own write lock while readers run
//! concurrently.

use std::sync::Arc;

use libsql::{Connection, Database};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::debug;

use crate::config::TursoConfig;
use epimatch_core::error::{Error, Result};

/// A connection checked out from the pool. Dropping it returns the permit;
/// libSQL connections themselves are cheap handles onto the shared
/// database, so nothing else needs releasing.
pub struct PooledConnection<'a> {
    pub connection: Connection,
    _permit: SemaphorePermit<'a>,
}

impl<'a> std::ops::Deref for PooledConnection<'a> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

/// Bounds the number of concurrently-used connections to a shared
/// [`Database`] handle.
pub struct ConnectionPool {
    db: Arc<Database>,
    semaphore: Semaphore,
    config: TursoConfig,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(db: Arc<Database>, config: TursoConfig) -> Self {
        let semaphore = Semaphore::new(config.max_connections);
        Self { db, semaphore, config }
    }

    /// Check out a connection, waiting for a free permit if the pool is at
    /// capacity.
    ///
    /// # Errors
    ///
    /// Returns `Err(Error::Storage)` if opening the underlying libSQL
    /// connection fails.
    pub async fn acquire(&self) -> Result<PooledConnection<'_>> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::Storage("connection pool semaphore closed".into()))?;
        let connection = self
            .db
            .connect()
            .map_err(|e| Error::Storage(format!("failed to open connection: {e}")))?;
        connection
            .busy_timeout(self.config.busy_timeout)
            .map_err(|e| Error::Storage(format!("failed to set busy_timeout: {e}")))?;
        debug!(max = self.config.max_connections, "checked out pooled connection");
        Ok(PooledConnection { connection, _permit: permit })
    }
}
