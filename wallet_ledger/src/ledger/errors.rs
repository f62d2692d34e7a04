//! Ledger error types.

use thiserror::Error;

use crate::cache::CacheError;
use crate::store::StoreError;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Referenced owner has no wallet
    #[error("Wallet not found for owner {0}")]
    WalletNotFound(String),

    /// Debit exceeds the available balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: i64, required: i64 },

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Owner identifier missing or blank
    #[error("Owner identifier must not be blank")]
    InvalidOwner,

    /// Idempotency token missing or blank
    #[error("Idempotency key must not be blank")]
    InvalidIdempotencyKey,

    /// Initiator and recipient are the same wallet
    #[error("Cannot transfer to the initiating wallet")]
    SelfTransfer,

    /// History page parameters out of range
    #[error("Invalid pagination: offset {offset}, limit {limit}")]
    InvalidPagination { offset: i64, limit: i64 },

    /// Credit would overflow the balance column
    #[error("Balance overflow")]
    BalanceOverflow,

    /// The cache could not say whether the token was already processed
    #[error("Idempotency lookup failed: {0}")]
    IdempotencyLookupFailed(#[source] CacheError),

    /// Begin/lock/query/commit failure; the unit of work was rolled back
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Backend errors are reduced to a generic message and owner identifiers
    /// are redacted.
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::WalletNotFound(_) => "Wallet not found".to_string(),
            LedgerError::IdempotencyLookupFailed(_) => {
                "Service temporarily unavailable, retry with the same idempotency key".to_string()
            }
            LedgerError::Store(_) | LedgerError::BalanceOverflow => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Whether retrying the identical request (same token) may succeed
    ///
    /// Transient kinds are retry-safe because the idempotency token guards
    /// against double application. Request-shape errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::IdempotencyLookupFailed(_) | LedgerError::Store(_)
        )
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_client_message_hides_backend_details() {
        let err = LedgerError::Store(StoreError::Unavailable("pg at 10.0.0.3 down".to_string()));
        assert_eq!(err.client_message(), "Internal server error");

        let err = LedgerError::WalletNotFound("0b6f3c1e-owner".to_string());
        assert!(!err.client_message().contains("0b6f3c1e"));
    }

    #[test]
    fn test_client_message_keeps_request_errors() {
        let err = LedgerError::InsufficientBalance {
            available: 1000,
            required: 1500,
        };
        assert!(err.client_message().contains("1500"));
        assert_eq!(LedgerError::InvalidAmount(-5).client_message(), "Invalid amount: -5");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(LedgerError::Store(StoreError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(
            LedgerError::IdempotencyLookupFailed(CacheError::Unavailable("down".to_string()))
                .is_retryable()
        );
        assert!(!LedgerError::WalletNotFound("a".to_string()).is_retryable());
        assert!(!LedgerError::InvalidAmount(0).is_retryable());
        assert!(
            !LedgerError::InsufficientBalance {
                available: 0,
                required: 1
            }
            .is_retryable()
        );
    }
}
