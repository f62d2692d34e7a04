//! # Wallet Ledger
//!
//! An idempotent wallet ledger: deposits, withdrawals and peer-to-peer
//! transfers over a relational store, deduplicated by caller-supplied
//! idempotency tokens and recorded in an append-only transaction log.
//!
//! ## Architecture
//!
//! - [`store`]: the durable ledger store (wallet rows, transaction log, row locks)
//! - [`cache`]: the volatile idempotency cache (token to transaction id)
//! - [`ledger`]: the engine that combines both into atomic units of work
//! - [`db`]: PostgreSQL pool, configuration, schema bootstrap and query timeouts
//!
//! ## Example
//!
//! ```no_run
//! use wallet_ledger::cache::MemoryIdempotencyCache;
//! use wallet_ledger::ledger::{EngineConfig, LedgerEngine};
//! use wallet_ledger::store::MemoryLedgerStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MemoryLedgerStore::new();
//!     store.provision_wallet("alice", 1_000).await?;
//!
//!     let engine = LedgerEngine::new(store, MemoryIdempotencyCache::new(), EngineConfig::default());
//!     let tx_id = engine.deposit("alice", "req-1", 500).await?;
//!     println!("deposit committed as {tx_id}");
//!     Ok(())
//! }
//! ```

/// Idempotency cache adapters.
pub mod cache;

/// PostgreSQL connection pooling and configuration.
pub mod db;

/// Ledger engine, models and error taxonomy.
pub mod ledger;
pub use ledger::{
    EngineConfig, HistoryPage, LedgerEngine, LedgerError, LedgerResult, TransactionKind,
    TransactionRecord, TransactionStatus, Wallet, WalletLedger,
};

/// Ledger store adapters.
pub mod store;
