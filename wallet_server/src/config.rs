//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use wallet_ledger::cache::{CacheConfig, MAX_IDEMPOTENCY_TTL};
use wallet_ledger::db::DatabaseConfig;
use wallet_ledger::ledger::EngineConfig;

/// Default HTTP bind address
pub const DEFAULT_BIND: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus exporter address; metrics are disabled when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Idempotency cache configuration
    pub cache: CacheConfig,
    /// Ledger engine configuration
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `redis_url_override` - Optional Redis URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if an address variable is set but cannot be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        redis_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(addr) => addr,
            None => parse_addr_env("SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };
        let metrics_bind = parse_addr_env("METRICS_BIND")?;

        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        let mut cache = CacheConfig::from_env();
        if let Some(url) = redis_url_override {
            cache.redis_url = url;
        }

        let engine = EngineConfig::from_env();

        Ok(ServerConfig {
            bind,
            metrics_bind,
            database,
            cache,
            engine,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.database_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                var: "DATABASE_URL".to_string(),
                hint: "e.g. postgres://postgres@localhost/wallet_ledger".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        if !(self.cache.redis_url.starts_with("redis://")
            || self.cache.redis_url.starts_with("rediss://"))
        {
            return Err(ConfigError::Invalid {
                var: "REDIS_URL".to_string(),
                reason: "Must start with redis:// or rediss://".to_string(),
            });
        }

        if self.engine.idempotency_ttl.is_zero() {
            return Err(ConfigError::Invalid {
                var: "IDEMPOTENCY_TTL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.engine.idempotency_ttl > MAX_IDEMPOTENCY_TTL {
            return Err(ConfigError::Invalid {
                var: "IDEMPOTENCY_TTL_SECS".to_string(),
                reason: format!("Cannot exceed {} seconds", MAX_IDEMPOTENCY_TTL.as_secs()),
            });
        }

        if self.engine.transaction_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "LEDGER_TRANSACTION_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if Some(self.bind) == self.metrics_bind {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an optional socket address variable; set but malformed is an error
fn parse_addr_env(key: &str) -> Result<Option<SocketAddr>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("'{value}' is not a socket address"),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            bind: DEFAULT_BIND,
            metrics_bind: Some("127.0.0.1:9090".parse().unwrap()),
            database: DatabaseConfig::development(),
            cache: CacheConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "Use postgres".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("DATABASE_URL"));
        assert!(msg.contains("Use postgres"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_pool_bounds() {
        let mut config = valid_config();
        config.database.min_connections = config.database.max_connections + 1;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "DB_MIN_CONNECTIONS"));
    }

    #[test]
    fn test_config_validation_redis_scheme() {
        let mut config = valid_config();
        config.cache.redis_url = "http://localhost:6379".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "REDIS_URL"));
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = valid_config();
        config.engine.transaction_timeout = Duration::ZERO;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_ttl_bounds() {
        let mut config = valid_config();
        config.engine.idempotency_ttl = Duration::from_secs(u64::MAX);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var, .. } if var == "IDEMPOTENCY_TTL_SECS"));

        config.engine.idempotency_ttl = MAX_IDEMPOTENCY_TTL;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_bind_is_loopback() {
        assert_eq!(DEFAULT_BIND.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_config_validation_metrics_port_clash() {
        let mut config = valid_config();
        config.metrics_bind = Some(config.bind);

        assert!(config.validate().is_err());
    }
}
