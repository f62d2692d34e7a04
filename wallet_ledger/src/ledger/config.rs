//! Engine configuration.

use std::time::Duration;

use crate::cache::DEFAULT_IDEMPOTENCY_TTL;
use crate::db::timeouts::DEFAULT_TRANSACTION_TIMEOUT;

/// Ledger engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a processed token stays in the idempotency cache
    pub idempotency_ttl: Duration,

    /// Upper bound on one unit of work, lock waits included
    pub transaction_timeout: Duration,
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// - `IDEMPOTENCY_TTL_SECS` (default: 86400)
    /// - `LEDGER_TRANSACTION_TIMEOUT_SECS` (default: 10)
    pub fn from_env() -> Self {
        Self {
            idempotency_ttl: secs_from_env("IDEMPOTENCY_TTL_SECS")
                .unwrap_or(DEFAULT_IDEMPOTENCY_TTL),
            transaction_timeout: secs_from_env("LEDGER_TRANSACTION_TIMEOUT_SECS")
                .unwrap_or(DEFAULT_TRANSACTION_TIMEOUT),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }
}

fn secs_from_env(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|secs: &u64| *secs > 0)
        .map(Duration::from_secs)
}
