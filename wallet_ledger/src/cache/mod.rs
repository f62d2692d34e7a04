//! Idempotency cache: a volatile, expiring map from
//! `(operation, owner, token)` to the transaction id produced by the first
//! successful execution of that request.
//!
//! The cache is an index over the ledger, never the record of truth. A hit
//! short-circuits the request; a miss means "go ask the store".

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::TransactionKind;

pub mod config;
pub mod memory;
pub mod redis;

pub use config::CacheConfig;
pub use memory::MemoryIdempotencyCache;
pub use self::redis::RedisIdempotencyCache;

/// Default retention window for idempotency entries (24 hours)
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Longest retention window a cache accepts (30 days)
pub const MAX_IDEMPOTENCY_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis error
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Cached value is not a transaction id
    #[error("Invalid cached value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    /// Retention window longer than `MAX_IDEMPOTENCY_TTL`
    #[error("Invalid idempotency TTL: {0:?}")]
    InvalidTtl(Duration),

    /// Cache backend unreachable
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache key scoped to one operation kind and one initiating owner
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub operation: TransactionKind,
    pub owner: String,
    pub token: String,
}

impl IdempotencyKey {
    pub fn new(operation: TransactionKind, owner: &str, token: &str) -> Self {
        Self {
            operation,
            owner: owner.to_string(),
            token: token.to_string(),
        }
    }
}

/// Renders `idempotency:{operation}:{owner_len}:{owner}:{token}`
///
/// The owner length prefix keeps keys unambiguous whatever characters the
/// owner and token contain.
impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "idempotency:{}:{}:{}:{}",
            self.operation,
            self.owner.len(),
            self.owner,
            self.token
        )
    }
}

/// Volatile token-to-transaction index
#[async_trait]
pub trait IdempotencyCache: Send + Sync {
    /// `Ok(None)` means the key was never set or has expired
    async fn get(&self, key: &IdempotencyKey) -> CacheResult<Option<Uuid>>;

    /// Remember `transaction_id` for `ttl`
    ///
    /// A `ttl` above [`MAX_IDEMPOTENCY_TTL`] fails with `CacheError::InvalidTtl`.
    async fn set(&self, key: &IdempotencyKey, transaction_id: Uuid, ttl: Duration)
    -> CacheResult<()>;

    /// Check the backend is reachable
    async fn ping(&self) -> CacheResult<()>;
}

pub(crate) fn parse_transaction_id(key: &IdempotencyKey, value: String) -> CacheResult<Uuid> {
    Uuid::parse_str(&value).map_err(|_| CacheError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        let key = IdempotencyKey::new(TransactionKind::Deposit, "alice", "req-1");
        assert_eq!(key.to_string(), "idempotency:deposit:5:alice:req-1");
    }

    #[test]
    fn test_keys_are_scoped_by_operation_and_owner() {
        let deposit = IdempotencyKey::new(TransactionKind::Deposit, "alice", "t");
        let withdraw = IdempotencyKey::new(TransactionKind::Withdrawal, "alice", "t");
        let other_owner = IdempotencyKey::new(TransactionKind::Deposit, "bob", "t");

        assert_ne!(deposit.to_string(), withdraw.to_string());
        assert_ne!(deposit.to_string(), other_owner.to_string());
    }

    #[test]
    fn test_owner_and_token_boundaries_do_not_collide() {
        let a = IdempotencyKey::new(TransactionKind::Transfer, "a:b", "c");
        let b = IdempotencyKey::new(TransactionKind::Transfer, "a", "b:c");
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_parse_transaction_id_rejects_garbage() {
        let key = IdempotencyKey::new(TransactionKind::Deposit, "alice", "t");
        let id = Uuid::new_v4();

        assert_eq!(parse_transaction_id(&key, id.to_string()).unwrap(), id);
        assert!(matches!(
            parse_transaction_id(&key, "not-a-uuid".to_string()),
            Err(CacheError::InvalidValue { .. })
        ));
    }
}
