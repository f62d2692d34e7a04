//! Ledger store: durable wallet rows, the append-only transaction log, and
//! the unit-of-work/row-lock primitives the engine builds on.
//!
//! A [`LedgerStore`] hands out [`LedgerTx`] units of work. Every row lock
//! taken through a unit of work is held until it commits or rolls back;
//! dropping an uncommitted unit of work rolls it back.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::{TransactionKind, TransactionRecord, Wallet};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryLedgerStore, MemoryLedgerTx};
pub use postgres::{PgLedgerStore, PgLedgerTx};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Operation did not finish in time
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// Balance change against a row this unit of work has not locked
    #[error("Wallet {0} is not locked by this unit of work")]
    NotLocked(Uuid),

    /// Write rejected by a ledger constraint (unique owner, non-negative balance)
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// Stored value could not be mapped back into a model
    #[error("Corrupt ledger row: {0}")]
    Decode(String),

    /// Backend unreachable or refused the operation
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Wallet row as seen under an exclusive lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedWallet {
    pub id: Uuid,
    pub owner: String,
    pub balance: i64,
}

/// Ledger row to append; id and timestamp are assigned by the store
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: i64,
    pub initiator_wallet_id: Uuid,
    pub initiator_owner: String,
    pub recipient_wallet_id: Option<Uuid>,
    pub recipient_owner: Option<String>,
    pub idempotency_key: String,
}

/// Transactional access to the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Unit of work type
    type Tx: LedgerTx + 'static;

    /// Open a unit of work
    async fn begin(&self) -> StoreResult<Self::Tx>;

    /// Point lookup without locking
    async fn find_wallet(&self, owner: &str) -> StoreResult<Option<Wallet>>;

    /// Number of transactions the wallet initiated or received
    async fn count_history(&self, wallet_id: Uuid) -> StoreResult<i64>;

    /// Transactions the wallet initiated or received, newest first
    async fn history(
        &self,
        wallet_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<TransactionRecord>>;

    /// Check the backend is reachable
    async fn ping(&self) -> StoreResult<()>;
}

/// A single unit of work against the ledger
#[async_trait]
pub trait LedgerTx: Send {
    /// Take an exclusive lock on the owner's wallet row
    ///
    /// Returns `None` when no such wallet exists. Locking a row already
    /// held by this unit of work returns it again without blocking.
    async fn lock_wallet(&mut self, owner: &str) -> StoreResult<Option<LockedWallet>>;

    /// Committed ledger row for this (initiator, kind, token), if any
    async fn find_by_idempotency_key(
        &mut self,
        initiator_wallet_id: Uuid,
        kind: TransactionKind,
        idempotency_key: &str,
    ) -> StoreResult<Option<TransactionRecord>>;

    /// Add `delta` to a locked wallet's balance and return the new balance
    async fn adjust_balance(&mut self, wallet_id: Uuid, delta: i64) -> StoreResult<i64>;

    /// Append a successful ledger row
    async fn append(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord>;

    /// Make every change durable and release the locks
    async fn commit(self) -> StoreResult<()>;

    /// Discard every change and release the locks
    async fn rollback(self) -> StoreResult<()>;
}
