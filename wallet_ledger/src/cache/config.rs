//! Idempotency cache configuration.

use std::env;

/// Redis URL used when `REDIS_URL` is unset
pub const DEVELOPMENT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Idempotency cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection URL (`redis://[:password@]host:port[/db]`)
    pub redis_url: String,
}

impl CacheConfig {
    /// Create configuration from environment variables
    ///
    /// - `REDIS_URL`: Redis connection string (default: [`DEVELOPMENT_REDIS_URL`])
    ///
    /// The retention window is part of [`crate::ledger::EngineConfig`].
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| DEVELOPMENT_REDIS_URL.to_string()),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: DEVELOPMENT_REDIS_URL.to_string(),
        }
    }
}
