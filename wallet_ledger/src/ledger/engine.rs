//! Ledger engine implementation.
//!
//! Every mutation runs the same pipeline: validate, consult the idempotency
//! cache, run one unit of work against the store (lock, replay check,
//! funds check, mutate, append, commit), then remember the result in the
//! cache on a best-effort basis.

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    EngineConfig, HistoryPage, LedgerError, LedgerResult, TransactionKind, TransactionRecord,
    Wallet,
};
use crate::cache::{IdempotencyCache, IdempotencyKey};
use crate::store::{LedgerStore, LedgerTx, LockedWallet, NewTransaction, StoreError};

/// Object-safe view of the engine for callers that should not care which
/// store and cache back it
#[async_trait]
pub trait WalletLedger: Send + Sync {
    /// Credit `amount` to the owner's wallet
    async fn deposit(&self, owner: &str, idempotency_key: &str, amount: i64) -> LedgerResult<Uuid>;

    /// Debit `amount` from the owner's wallet
    async fn withdraw(&self, owner: &str, idempotency_key: &str, amount: i64)
    -> LedgerResult<Uuid>;

    /// Move `amount` from the initiator's wallet to the recipient's wallet
    async fn transfer(
        &self,
        initiator: &str,
        recipient: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid>;

    async fn get_wallet(&self, owner: &str) -> LedgerResult<Wallet>;

    async fn get_history(&self, owner: &str, offset: i64, limit: i64) -> LedgerResult<HistoryPage>;

    /// Ping both the store and the cache
    async fn health_check(&self) -> LedgerResult<()>;
}

/// A validated mutation request
#[derive(Debug, Clone, Copy)]
enum Mutation<'a> {
    Deposit {
        owner: &'a str,
        amount: i64,
    },
    Withdrawal {
        owner: &'a str,
        amount: i64,
    },
    Transfer {
        initiator: &'a str,
        recipient: &'a str,
        amount: i64,
    },
}

impl Mutation<'_> {
    fn kind(&self) -> TransactionKind {
        match self {
            Mutation::Deposit { .. } => TransactionKind::Deposit,
            Mutation::Withdrawal { .. } => TransactionKind::Withdrawal,
            Mutation::Transfer { .. } => TransactionKind::Transfer,
        }
    }

    fn initiator(&self) -> &str {
        match self {
            Mutation::Deposit { owner, .. } | Mutation::Withdrawal { owner, .. } => owner,
            Mutation::Transfer { initiator, .. } => initiator,
        }
    }

    fn amount(&self) -> i64 {
        match self {
            Mutation::Deposit { amount, .. }
            | Mutation::Withdrawal { amount, .. }
            | Mutation::Transfer { amount, .. } => *amount,
        }
    }

    /// Reject malformed requests before touching the cache or the store
    fn validate(&self, idempotency_key: &str) -> LedgerResult<()> {
        if self.amount() <= 0 {
            return Err(LedgerError::InvalidAmount(self.amount()));
        }
        if self.initiator().trim().is_empty() {
            return Err(LedgerError::InvalidOwner);
        }
        if let Mutation::Transfer {
            initiator,
            recipient,
            ..
        } = self
        {
            if recipient.trim().is_empty() {
                return Err(LedgerError::InvalidOwner);
            }
            if initiator == recipient {
                return Err(LedgerError::SelfTransfer);
            }
        }
        if idempotency_key.trim().is_empty() {
            return Err(LedgerError::InvalidIdempotencyKey);
        }
        Ok(())
    }
}

/// Result of a unit of work
enum Outcome {
    /// The mutation was applied and recorded
    Applied(TransactionRecord),
    /// The ledger already held a record for this token
    Replayed(TransactionRecord),
}

/// Order in which a transfer locks its two wallet rows
///
/// Ascending owner order is a single total order shared by every transfer,
/// so two transfers that cross (A to B while B to A) never wait on each
/// other in a cycle.
fn lock_order<'a>(initiator: &'a str, recipient: &'a str) -> [&'a str; 2] {
    if initiator <= recipient {
        [initiator, recipient]
    } else {
        [recipient, initiator]
    }
}

async fn lock_existing<T: LedgerTx>(tx: &mut T, owner: &str) -> LedgerResult<LockedWallet> {
    tx.lock_wallet(owner)
        .await?
        .ok_or_else(|| LedgerError::WalletNotFound(owner.to_string()))
}

/// Wallet ledger engine
///
/// Holds no state between calls beyond its injected store, cache and
/// configuration; all cross-call state lives in those two backends.
pub struct LedgerEngine<S, C> {
    store: S,
    cache: C,
    config: EngineConfig,
}

impl<S, C> LedgerEngine<S, C>
where
    S: LedgerStore,
    C: IdempotencyCache,
{
    pub fn new(store: S, cache: C, config: EngineConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Credit `amount` to the owner's wallet
    ///
    /// Returns the id of the ledger record; repeating the call with the same
    /// `(owner, idempotency_key)` returns the same id without a second credit.
    ///
    /// # Errors
    ///
    /// * `LedgerError::InvalidAmount` - `amount` is not positive
    /// * `LedgerError::WalletNotFound` - Owner has no wallet
    /// * `LedgerError::IdempotencyLookupFailed` - Cache could not be consulted
    /// * `LedgerError::Store` - Backend failure, nothing was applied
    pub async fn deposit(
        &self,
        owner: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid> {
        self.execute(Mutation::Deposit { owner, amount }, idempotency_key)
            .await
    }

    /// Debit `amount` from the owner's wallet
    ///
    /// # Errors
    ///
    /// * `LedgerError::InsufficientBalance` - Balance below `amount`; nothing is recorded
    /// * Otherwise as [`LedgerEngine::deposit`]
    pub async fn withdraw(
        &self,
        owner: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid> {
        self.execute(Mutation::Withdrawal { owner, amount }, idempotency_key)
            .await
    }

    /// Move `amount` from `initiator` to `recipient` as one ledger record
    ///
    /// The token is scoped to the initiator.
    ///
    /// # Errors
    ///
    /// * `LedgerError::SelfTransfer` - Initiator and recipient are the same owner
    /// * `LedgerError::WalletNotFound` - Either wallet is missing
    /// * `LedgerError::InsufficientBalance` - Initiator balance below `amount`
    /// * Otherwise as [`LedgerEngine::deposit`]
    pub async fn transfer(
        &self,
        initiator: &str,
        recipient: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid> {
        self.execute(
            Mutation::Transfer {
                initiator,
                recipient,
                amount,
            },
            idempotency_key,
        )
        .await
    }

    /// Look up a wallet without locking it
    pub async fn get_wallet(&self, owner: &str) -> LedgerResult<Wallet> {
        if owner.trim().is_empty() {
            return Err(LedgerError::InvalidOwner);
        }

        self.store
            .find_wallet(owner)
            .await?
            .ok_or_else(|| LedgerError::WalletNotFound(owner.to_string()))
    }

    /// One page of the wallet's transactions, newest first, with the total count
    ///
    /// A wallet without transactions yields an empty page and a total of 0.
    pub async fn get_history(
        &self,
        owner: &str,
        offset: i64,
        limit: i64,
    ) -> LedgerResult<HistoryPage> {
        if offset < 0 || limit <= 0 {
            return Err(LedgerError::InvalidPagination { offset, limit });
        }

        let wallet = self.get_wallet(owner).await?;

        let total = self.store.count_history(wallet.id).await?;
        if total == 0 {
            return Ok(HistoryPage::empty(offset, limit));
        }

        let transactions = self.store.history(wallet.id, offset, limit).await?;
        Ok(HistoryPage {
            transactions,
            total,
            offset,
            limit,
        })
    }

    pub async fn health_check(&self) -> LedgerResult<()> {
        self.store.ping().await?;
        self.cache
            .ping()
            .await
            .map_err(LedgerError::IdempotencyLookupFailed)?;
        Ok(())
    }

    async fn execute(&self, mutation: Mutation<'_>, idempotency_key: &str) -> LedgerResult<Uuid> {
        mutation.validate(idempotency_key)?;

        let kind = mutation.kind();
        let key = IdempotencyKey::new(kind, mutation.initiator(), idempotency_key);

        // Fast path. A lookup failure blocks the mutation: proceeding
        // without knowing whether the token was seen risks applying it twice.
        match self.cache.get(&key).await {
            Ok(Some(transaction_id)) => {
                log::debug!("Idempotent replay of {key} from cache: {transaction_id}");
                return Ok(transaction_id);
            }
            Ok(None) => {}
            Err(e) => {
                log::warn!("Idempotency lookup failed for {key}: {e}");
                return Err(LedgerError::IdempotencyLookupFailed(e));
            }
        }

        let timeout = self.config.transaction_timeout;
        let outcome = tokio::time::timeout(timeout, self.run_unit_of_work(mutation, idempotency_key))
            .await
            .map_err(|_| StoreError::Timeout(timeout))??;

        let record = match outcome {
            Outcome::Applied(record) => {
                log::info!(
                    "{} of {} committed for {} as {}",
                    kind,
                    record.amount,
                    record.initiator_owner,
                    record.id
                );
                record
            }
            Outcome::Replayed(record) => {
                log::info!("Idempotent replay of {key} from ledger: {}", record.id);
                record
            }
        };

        // The mutation is durable; a cache write failure must not fail the caller
        if let Err(e) = self
            .cache
            .set(&key, record.id, self.config.idempotency_ttl)
            .await
        {
            log::error!(
                "Failed to cache idempotency key {key} for transaction {}: {e}",
                record.id
            );
        }

        Ok(record.id)
    }

    /// Run one unit of work, committing on success and rolling back otherwise
    ///
    /// Dropping the returned future (timeout or caller cancellation) drops the
    /// unit of work, which also rolls it back.
    async fn run_unit_of_work(
        &self,
        mutation: Mutation<'_>,
        idempotency_key: &str,
    ) -> LedgerResult<Outcome> {
        let mut tx = self.store.begin().await?;

        match self.apply(&mut tx, mutation, idempotency_key).await {
            Ok(outcome) => {
                tx.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    log::warn!("Rollback after '{e}' failed: {rollback_err}");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut S::Tx,
        mutation: Mutation<'_>,
        idempotency_key: &str,
    ) -> LedgerResult<Outcome> {
        let kind = mutation.kind();

        match mutation {
            Mutation::Deposit { owner, amount } => {
                let wallet = lock_existing(tx, owner).await?;
                if let Some(existing) = tx
                    .find_by_idempotency_key(wallet.id, kind, idempotency_key)
                    .await?
                {
                    return Ok(Outcome::Replayed(existing));
                }

                wallet
                    .balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow)?;
                tx.adjust_balance(wallet.id, amount).await?;

                let record = tx
                    .append(NewTransaction {
                        kind,
                        amount,
                        initiator_wallet_id: wallet.id,
                        initiator_owner: wallet.owner,
                        recipient_wallet_id: None,
                        recipient_owner: None,
                        idempotency_key: idempotency_key.to_string(),
                    })
                    .await?;
                Ok(Outcome::Applied(record))
            }
            Mutation::Withdrawal { owner, amount } => {
                let wallet = lock_existing(tx, owner).await?;
                if let Some(existing) = tx
                    .find_by_idempotency_key(wallet.id, kind, idempotency_key)
                    .await?
                {
                    return Ok(Outcome::Replayed(existing));
                }

                // Checked under the same lock as the debit below
                if wallet.balance < amount {
                    return Err(LedgerError::InsufficientBalance {
                        available: wallet.balance,
                        required: amount,
                    });
                }
                tx.adjust_balance(wallet.id, -amount).await?;

                let record = tx
                    .append(NewTransaction {
                        kind,
                        amount,
                        initiator_wallet_id: wallet.id,
                        initiator_owner: wallet.owner,
                        recipient_wallet_id: None,
                        recipient_owner: None,
                        idempotency_key: idempotency_key.to_string(),
                    })
                    .await?;
                Ok(Outcome::Applied(record))
            }
            Mutation::Transfer {
                initiator,
                recipient,
                amount,
            } => {
                let [first, second] = lock_order(initiator, recipient);
                let first = lock_existing(tx, first).await?;
                let second = lock_existing(tx, second).await?;
                let (from, to) = if first.owner == initiator {
                    (first, second)
                } else {
                    (second, first)
                };

                if let Some(existing) = tx
                    .find_by_idempotency_key(from.id, kind, idempotency_key)
                    .await?
                {
                    return Ok(Outcome::Replayed(existing));
                }

                if from.balance < amount {
                    return Err(LedgerError::InsufficientBalance {
                        available: from.balance,
                        required: amount,
                    });
                }
                to.balance
                    .checked_add(amount)
                    .ok_or(LedgerError::BalanceOverflow)?;

                tx.adjust_balance(from.id, -amount).await?;
                tx.adjust_balance(to.id, amount).await?;

                let record = tx
                    .append(NewTransaction {
                        kind,
                        amount,
                        initiator_wallet_id: from.id,
                        initiator_owner: from.owner,
                        recipient_wallet_id: Some(to.id),
                        recipient_owner: Some(to.owner),
                        idempotency_key: idempotency_key.to_string(),
                    })
                    .await?;
                Ok(Outcome::Applied(record))
            }
        }
    }
}

#[async_trait]
impl<S, C> WalletLedger for LedgerEngine<S, C>
where
    S: LedgerStore,
    C: IdempotencyCache,
{
    async fn deposit(&self, owner: &str, idempotency_key: &str, amount: i64) -> LedgerResult<Uuid> {
        LedgerEngine::deposit(self, owner, idempotency_key, amount).await
    }

    async fn withdraw(
        &self,
        owner: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid> {
        LedgerEngine::withdraw(self, owner, idempotency_key, amount).await
    }

    async fn transfer(
        &self,
        initiator: &str,
        recipient: &str,
        idempotency_key: &str,
        amount: i64,
    ) -> LedgerResult<Uuid> {
        LedgerEngine::transfer(self, initiator, recipient, idempotency_key, amount).await
    }

    async fn get_wallet(&self, owner: &str) -> LedgerResult<Wallet> {
        LedgerEngine::get_wallet(self, owner).await
    }

    async fn get_history(&self, owner: &str, offset: i64, limit: i64) -> LedgerResult<HistoryPage> {
        LedgerEngine::get_history(self, owner, offset, limit).await
    }

    async fn health_check(&self) -> LedgerResult<()> {
        LedgerEngine::health_check(self).await
    }
}
