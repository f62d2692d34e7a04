//! Wallet ledger engine.
//!
//! This module implements:
//! - Deposits, withdrawals and peer-to-peer transfers as atomic units of work
//! - Two-tier idempotency: a volatile cache in front of the durable ledger
//! - Pessimistic row locking, two-row locks taken in a global order
//! - An append-only transaction record for every committed mutation
//!
//! ## Example
//!
//! ```no_run
//! use wallet_ledger::cache::{CacheConfig, RedisIdempotencyCache};
//! use wallet_ledger::db::{Database, DatabaseConfig};
//! use wallet_ledger::ledger::{EngineConfig, LedgerEngine};
//! use wallet_ledger::store::PgLedgerStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&DatabaseConfig::from_env()).await?;
//!     let cache = RedisIdempotencyCache::connect(&CacheConfig::from_env()).await?;
//!     let engine = LedgerEngine::new(
//!         PgLedgerStore::new(db.pool().clone()),
//!         cache,
//!         EngineConfig::from_env(),
//!     );
//!
//!     let tx_id = engine.transfer("alice", "bob", "transfer-42", 2_500).await?;
//!     println!("transfer committed as {tx_id}");
//!
//!     let page = engine.get_history("bob", 0, 10).await?;
//!     println!("bob has {} transactions", page.total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod errors;
pub mod models;

pub use config::EngineConfig;
pub use engine::{LedgerEngine, WalletLedger};
pub use errors::{LedgerError, LedgerResult};
pub use models::{HistoryPage, TransactionKind, TransactionRecord, TransactionStatus, Wallet};
