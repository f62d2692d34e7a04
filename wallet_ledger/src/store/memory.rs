//! In-process ledger store.
//!
//! Each wallet row carries its own async mutex; a unit of work keeps the
//! owned guards until it finishes, so lock semantics match a row-locking
//! database. The committed balance lives apart from that mutex, so plain
//! reads never wait for a unit of work. Writes are staged on the unit of
//! work and published only on commit, which makes rollback (explicit or by
//! drop) a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock as StdRwLock};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, LockedWallet, NewTransaction, StoreError, StoreResult};
use crate::ledger::{TransactionKind, TransactionRecord, TransactionStatus, Wallet};

#[derive(Debug, Clone, Copy)]
struct Committed {
    balance: i64,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct WalletRow {
    id: Uuid,
    owner: String,
    created_at: DateTime<Utc>,
    committed: StdRwLock<Committed>,
    lock: Arc<Mutex<()>>,
}

impl WalletRow {
    fn committed(&self) -> Committed {
        *self.committed.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, balance: i64, updated_at: DateTime<Utc>) {
        *self.committed.write().unwrap_or_else(PoisonError::into_inner) = Committed {
            balance,
            updated_at,
        };
    }

    fn to_wallet(&self) -> Wallet {
        let committed = self.committed();
        Wallet {
            id: self.id,
            owner: self.owner.clone(),
            balance: committed.balance,
            created_at: self.created_at,
            updated_at: committed.updated_at,
        }
    }
}

/// A row lock held by a unit of work
struct HeldRow {
    row: Arc<WalletRow>,
    _guard: OwnedMutexGuard<()>,
}

#[derive(Default)]
struct Inner {
    wallets: RwLock<HashMap<String, Arc<WalletRow>>>,
    ledger: Mutex<Vec<TransactionRecord>>,
    fail_next_commit: AtomicBool,
}

/// In-memory ledger store for tests and local development
#[derive(Clone, Default)]
pub struct MemoryLedgerStore {
    inner: Arc<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a wallet for `owner` (out-of-band provisioning)
    ///
    /// # Errors
    ///
    /// * `StoreError::Constraint` - Owner already has a wallet or the balance is negative
    pub async fn provision_wallet(&self, owner: &str, initial_balance: i64) -> StoreResult<Wallet> {
        if initial_balance < 0 {
            return Err(StoreError::Constraint(format!(
                "opening balance must be non-negative, got {initial_balance}"
            )));
        }

        let mut wallets = self.inner.wallets.write().await;
        if wallets.contains_key(owner) {
            return Err(StoreError::Constraint(format!(
                "owner {owner} already has a wallet"
            )));
        }

        let now = Utc::now();
        let row = WalletRow {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            created_at: now,
            committed: StdRwLock::new(Committed {
                balance: initial_balance,
                updated_at: now,
            }),
            lock: Arc::new(Mutex::new(())),
        };
        let wallet = row.to_wallet();
        wallets.insert(owner.to_string(), Arc::new(row));

        Ok(wallet)
    }

    /// Every committed ledger row, in commit order
    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.inner.ledger.lock().await.clone()
    }

    /// Make the next commit fail; its unit of work is discarded
    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    async fn row(&self, owner: &str) -> Option<Arc<WalletRow>> {
        self.inner.wallets.read().await.get(owner).cloned()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    type Tx = MemoryLedgerTx;

    async fn begin(&self) -> StoreResult<MemoryLedgerTx> {
        Ok(MemoryLedgerTx {
            inner: Arc::clone(&self.inner),
            locks: Vec::new(),
            staged_balances: HashMap::new(),
            staged_records: Vec::new(),
        })
    }

    /// Last committed state; never waits on a row lock
    async fn find_wallet(&self, owner: &str) -> StoreResult<Option<Wallet>> {
        Ok(self.row(owner).await.map(|row| row.to_wallet()))
    }

    async fn count_history(&self, wallet_id: Uuid) -> StoreResult<i64> {
        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.iter().filter(|r| r.involves(wallet_id)).count() as i64)
    }

    async fn history(
        &self,
        wallet_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let ledger = self.inner.ledger.lock().await;

        // Commit order breaks timestamp ties, newest first
        let mut matching: Vec<&TransactionRecord> =
            ledger.iter().rev().filter(|r| r.involves(wallet_id)).collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Unit of work over [`MemoryLedgerStore`]
pub struct MemoryLedgerTx {
    inner: Arc<Inner>,
    locks: Vec<HeldRow>,
    staged_balances: HashMap<Uuid, i64>,
    staged_records: Vec<TransactionRecord>,
}

impl MemoryLedgerTx {
    fn snapshot(&self, row: &WalletRow) -> LockedWallet {
        LockedWallet {
            id: row.id,
            owner: row.owner.clone(),
            balance: self
                .staged_balances
                .get(&row.id)
                .copied()
                .unwrap_or_else(|| row.committed().balance),
        }
    }
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn lock_wallet(&mut self, owner: &str) -> StoreResult<Option<LockedWallet>> {
        if let Some(held) = self.locks.iter().find(|held| held.row.owner == owner) {
            return Ok(Some(self.snapshot(&held.row)));
        }

        let row = self.inner.wallets.read().await.get(owner).cloned();
        let Some(row) = row else {
            return Ok(None);
        };

        let guard = Arc::clone(&row.lock).lock_owned().await;
        let locked = self.snapshot(&row);
        self.locks.push(HeldRow { row, _guard: guard });

        Ok(Some(locked))
    }

    async fn find_by_idempotency_key(
        &mut self,
        initiator_wallet_id: Uuid,
        kind: TransactionKind,
        idempotency_key: &str,
    ) -> StoreResult<Option<TransactionRecord>> {
        let same_key = |r: &&TransactionRecord| {
            r.initiator_wallet_id == initiator_wallet_id
                && r.kind == kind
                && r.idempotency_key == idempotency_key
        };

        if let Some(staged) = self.staged_records.iter().find(same_key) {
            return Ok(Some(staged.clone()));
        }

        let ledger = self.inner.ledger.lock().await;
        Ok(ledger.iter().find(same_key).cloned())
    }

    async fn adjust_balance(&mut self, wallet_id: Uuid, delta: i64) -> StoreResult<i64> {
        let current = self
            .locks
            .iter()
            .find(|held| held.row.id == wallet_id)
            .map(|held| self.snapshot(&held.row).balance)
            .ok_or(StoreError::NotLocked(wallet_id))?;

        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::Constraint(format!("balance overflow on {wallet_id}")))?;
        if next < 0 {
            return Err(StoreError::Constraint(format!(
                "balance of {wallet_id} would become {next}"
            )));
        }

        self.staged_balances.insert(wallet_id, next);
        Ok(next)
    }

    async fn append(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord> {
        if entry.amount <= 0 {
            return Err(StoreError::Constraint(format!(
                "amount must be positive, got {}",
                entry.amount
            )));
        }

        let existing = self
            .find_by_idempotency_key(entry.initiator_wallet_id, entry.kind, &entry.idempotency_key)
            .await?;
        if existing.is_some() {
            return Err(StoreError::Constraint(format!(
                "duplicate idempotency key {} for {}",
                entry.idempotency_key, entry.kind
            )));
        }

        let record = TransactionRecord {
            id: Uuid::new_v4(),
            kind: entry.kind,
            status: TransactionStatus::Success,
            amount: entry.amount,
            initiator_wallet_id: entry.initiator_wallet_id,
            initiator_owner: entry.initiator_owner,
            recipient_wallet_id: entry.recipient_wallet_id,
            recipient_owner: entry.recipient_owner,
            idempotency_key: entry.idempotency_key,
            created_at: Utc::now(),
        };
        self.staged_records.push(record.clone());

        Ok(record)
    }

    async fn commit(mut self) -> StoreResult<()> {
        if self.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit rejected".to_string()));
        }

        let staged = std::mem::take(&mut self.staged_records);
        let mut ledger = self.inner.ledger.lock().await;

        let now = Utc::now();
        for held in &self.locks {
            if let Some(balance) = self.staged_balances.get(&held.row.id) {
                held.row.publish(*balance, now);
            }
        }
        ledger.extend(staged);

        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
