//! PostgreSQL ledger store.
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a single database
//! transaction, so they are held until commit or rollback.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::time::Duration;
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, LockedWallet, NewTransaction, StoreError, StoreResult};
use crate::db::timeouts::{DEFAULT_QUERY_TIMEOUT, with_timeout};
use crate::ledger::{TransactionKind, TransactionRecord, TransactionStatus, Wallet};

const RECORD_SOURCE: &str = r#"
    t.id, t.kind, t.status, t.amount,
    t.initiator_wallet_id, iw.owner AS initiator_owner,
    t.recipient_wallet_id, rw.owner AS recipient_owner,
    t.idempotency_key, t.created_at
    FROM transactions t
    JOIN wallets iw ON iw.id = t.initiator_wallet_id
    LEFT JOIN wallets rw ON rw.id = t.recipient_wallet_id
"#;

/// PostgreSQL-backed ledger store
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgLedgerStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the timeout applied to read queries
    pub fn with_query_timeout(mut self, query_timeout: Duration) -> Self {
        self.query_timeout = query_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create a wallet for `owner` (out-of-band provisioning)
    ///
    /// # Errors
    ///
    /// * `StoreError::Database` - Owner already has a wallet or the balance is negative
    pub async fn provision_wallet(&self, owner: &str, initial_balance: i64) -> StoreResult<Wallet> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(
                r#"
                INSERT INTO wallets (id, owner, balance)
                VALUES ($1, $2, $3)
                RETURNING id, owner, balance, created_at, updated_at
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(owner)
            .bind(initial_balance)
            .fetch_one(&self.pool),
        )
        .await?;

        wallet_from_row(&row)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> StoreResult<PgLedgerTx> {
        let tx = self.pool.begin().await?;
        Ok(PgLedgerTx { tx })
    }

    async fn find_wallet(&self, owner: &str) -> StoreResult<Option<Wallet>> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(
                r#"
                SELECT id, owner, balance, created_at, updated_at
                FROM wallets
                WHERE owner = $1
                "#,
            )
            .bind(owner)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn count_history(&self, wallet_id: Uuid) -> StoreResult<i64> {
        let row = with_timeout(
            self.query_timeout,
            sqlx::query(
                "SELECT COUNT(*) AS total FROM transactions
                 WHERE initiator_wallet_id = $1 OR recipient_wallet_id = $1",
            )
            .bind(wallet_id)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.try_get("total")?)
    }

    async fn history(
        &self,
        wallet_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let query = format!(
            "SELECT {RECORD_SOURCE}
             WHERE t.initiator_wallet_id = $1 OR t.recipient_wallet_id = $1
             ORDER BY t.created_at DESC, t.id DESC
             OFFSET $2 LIMIT $3"
        );

        let rows = with_timeout(
            self.query_timeout,
            sqlx::query(&query)
                .bind(wallet_id)
                .bind(offset)
                .bind(limit)
                .fetch_all(&self.pool),
        )
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        with_timeout(self.query_timeout, sqlx::query("SELECT 1").execute(&self.pool)).await?;
        Ok(())
    }
}

/// One PostgreSQL transaction
///
/// sqlx rolls the transaction back when this value is dropped uncommitted.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_wallet(&mut self, owner: &str) -> StoreResult<Option<LockedWallet>> {
        let row = sqlx::query("SELECT id, owner, balance FROM wallets WHERE owner = $1 FOR UPDATE")
            .bind(owner)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| -> StoreResult<LockedWallet> {
            Ok(LockedWallet {
                id: row.try_get("id")?,
                owner: row.try_get("owner")?,
                balance: row.try_get("balance")?,
            })
        })
        .transpose()
    }

    async fn find_by_idempotency_key(
        &mut self,
        initiator_wallet_id: Uuid,
        kind: TransactionKind,
        idempotency_key: &str,
    ) -> StoreResult<Option<TransactionRecord>> {
        let query = format!(
            "SELECT {RECORD_SOURCE}
             WHERE t.initiator_wallet_id = $1 AND t.kind = $2 AND t.idempotency_key = $3"
        );

        let row = sqlx::query(&query)
            .bind(initiator_wallet_id)
            .bind(kind.as_str())
            .bind(idempotency_key)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn adjust_balance(&mut self, wallet_id: Uuid, delta: i64) -> StoreResult<i64> {
        let row = sqlx::query(
            "UPDATE wallets
             SET balance = balance + $1, updated_at = NOW()
             WHERE id = $2
             RETURNING balance",
        )
        .bind(delta)
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(StoreError::NotLocked(wallet_id))?;

        Ok(row.try_get("balance")?)
    }

    async fn append(&mut self, entry: NewTransaction) -> StoreResult<TransactionRecord> {
        let id = Uuid::new_v4();
        let row = sqlx::query(
            r#"
            INSERT INTO transactions
                (id, initiator_wallet_id, recipient_wallet_id, kind, status, amount, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING created_at
            "#,
        )
        .bind(id)
        .bind(entry.initiator_wallet_id)
        .bind(entry.recipient_wallet_id)
        .bind(entry.kind.as_str())
        .bind(TransactionStatus::Success.as_str())
        .bind(entry.amount)
        .bind(&entry.idempotency_key)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(TransactionRecord {
            id,
            kind: entry.kind,
            status: TransactionStatus::Success,
            amount: entry.amount,
            initiator_wallet_id: entry.initiator_wallet_id,
            initiator_owner: entry.initiator_owner,
            recipient_wallet_id: entry.recipient_wallet_id,
            recipient_owner: entry.recipient_owner,
            idempotency_key: entry.idempotency_key,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn wallet_from_row(row: &PgRow) -> StoreResult<Wallet> {
    Ok(Wallet {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> StoreResult<TransactionRecord> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;

    Ok(TransactionRecord {
        id: row.try_get("id")?,
        kind: kind.parse().map_err(StoreError::Decode)?,
        status: status.parse().map_err(StoreError::Decode)?,
        amount: row.try_get("amount")?,
        initiator_wallet_id: row.try_get("initiator_wallet_id")?,
        initiator_owner: row.try_get("initiator_owner")?,
        recipient_wallet_id: row.try_get("recipient_wallet_id")?,
        recipient_owner: row.try_get("recipient_owner")?,
        idempotency_key: row.try_get("idempotency_key")?,
        created_at: row.try_get("created_at")?,
    })
}
