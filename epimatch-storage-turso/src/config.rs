//! Connection and pool configuration for the Turso/libSQL backend.

use std::time::Duration;

/// Knobs for the durable store's connection discipline (§4.5): write-ahead
/// logging, a busy-wait on write contention, and a bounded pool.
#[derive(Debug, Clone)]
pub struct TursoConfig {
    /// Maximum number of pooled connections. Default 10, per §4.5.
    pub max_connections: usize,
    /// How long a writer busy-waits on contention before giving up.
    pub busy_timeout: Duration,
    /// Retry attempts for a transient storage failure.
    pub max_retries: u32,
    /// Base delay for the retry backoff.
    pub retry_base_delay: Duration,
}

impl Default for TursoConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            busy_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}
