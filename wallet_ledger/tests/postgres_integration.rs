//! Integration tests against a live PostgreSQL ledger.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a disposable database. The
//! ledger table is append-only, so every test works on freshly named owners
//! instead of cleaning up.

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use wallet_ledger::cache::{IdempotencyKey, MemoryIdempotencyCache};
use wallet_ledger::db::{Database, DatabaseConfig};
use wallet_ledger::store::{LedgerStore, LedgerTx, PgLedgerStore, StoreError};
use wallet_ledger::{EngineConfig, LedgerEngine, LedgerError, TransactionKind};

type Engine = LedgerEngine<PgLedgerStore, MemoryIdempotencyCache>;

/// Helper to connect and bootstrap the schema, or `None` when no database is configured
async fn setup_store() -> Option<PgLedgerStore> {
    let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

    let config = DatabaseConfig {
        database_url,
        max_connections: 10,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to create test database");
    db.ensure_schema().await.expect("Failed to apply schema");

    Some(PgLedgerStore::new(db.pool().clone()).with_query_timeout(Duration::from_secs(2)))
}

/// Generate an owner name no earlier run has used
fn unique_owner(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

async fn setup_engine(config: EngineConfig) -> Option<Engine> {
    let store = setup_store().await?;
    Some(LedgerEngine::new(store, MemoryIdempotencyCache::new(), config))
}

#[tokio::test]
#[serial]
async fn test_deposit_withdraw_round_trip() {
    let Some(engine) = setup_engine(EngineConfig::default()).await else {
        return;
    };
    let owner = unique_owner("pg_round_trip");
    engine.store().provision_wallet(&owner, 1000).await.unwrap();

    let deposit = engine.deposit(&owner, "k2", 500).await.unwrap();
    let replay = engine.deposit(&owner, "k2", 500).await.unwrap();
    assert_eq!(deposit, replay);

    assert!(matches!(
        engine.withdraw(&owner, "k1", 1600).await,
        Err(LedgerError::InsufficientBalance { .. })
    ));
    engine.withdraw(&owner, "k3", 1500).await.unwrap();

    let wallet = engine.get_wallet(&owner).await.unwrap();
    assert_eq!(wallet.balance, 0);

    let page = engine.get_history(&owner, 0, 10).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.transactions[0].kind, TransactionKind::Withdrawal);
    assert_eq!(page.transactions[1].id, deposit);
}

#[tokio::test]
#[serial]
async fn test_durable_replay_after_cache_loss() {
    let Some(engine) = setup_engine(EngineConfig::default()).await else {
        return;
    };
    let alice = unique_owner("pg_alice");
    let bob = unique_owner("pg_bob");
    engine.store().provision_wallet(&alice, 300).await.unwrap();
    engine.store().provision_wallet(&bob, 0).await.unwrap();

    let first = engine.transfer(&alice, &bob, "pay", 120).await.unwrap();
    engine
        .cache()
        .evict(&IdempotencyKey::new(TransactionKind::Transfer, &alice, "pay"))
        .await;
    let replay = engine.transfer(&alice, &bob, "pay", 120).await.unwrap();

    assert_eq!(first, replay);
    assert_eq!(engine.get_wallet(&alice).await.unwrap().balance, 180);
    assert_eq!(engine.get_wallet(&bob).await.unwrap().balance, 120);

    let bob_history = engine.get_history(&bob, 0, 10).await.unwrap();
    assert_eq!(bob_history.total, 1);
    assert_eq!(bob_history.transactions[0].recipient_owner.as_deref(), Some(bob.as_str()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_withdrawals_respect_row_lock() {
    let Some(engine) = setup_engine(EngineConfig::default()).await else {
        return;
    };
    let engine = Arc::new(engine);
    let owner = unique_owner("pg_concurrent");
    engine.store().provision_wallet(&owner, 100).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let owner = owner.clone();
            tokio::spawn(async move { engine.withdraw(&owner, &format!("w{i}"), 30).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(engine.get_wallet(&owner).await.unwrap().balance, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_crossing_transfers_do_not_deadlock() {
    let Some(engine) = setup_engine(EngineConfig::default()).await else {
        return;
    };
    let engine = Arc::new(engine);
    let alice = unique_owner("pg_cross_a");
    let bob = unique_owner("pg_cross_b");
    engine.store().provision_wallet(&alice, 1000).await.unwrap();
    engine.store().provision_wallet(&bob, 1000).await.unwrap();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let engine = Arc::clone(&engine);
            let (from, to) = if i % 2 == 0 {
                (alice.clone(), bob.clone())
            } else {
                (bob.clone(), alice.clone())
            };
            tokio::spawn(async move { engine.transfer(&from, &to, &format!("x{i}"), 7).await })
        })
        .collect();

    let all = async {
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
    };
    tokio::time::timeout(Duration::from_secs(20), all)
        .await
        .expect("Crossing transfers deadlocked");

    // 10 each way
    assert_eq!(engine.get_wallet(&alice).await.unwrap().balance, 1000);
    assert_eq!(engine.get_wallet(&bob).await.unwrap().balance, 1000);
    assert_eq!(engine.get_history(&alice, 0, 50).await.unwrap().total, 20);
}

#[tokio::test]
#[serial]
async fn test_lock_wait_times_out_and_rolls_back() {
    let config = EngineConfig {
        transaction_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let Some(engine) = setup_engine(config).await else {
        return;
    };
    let owner = unique_owner("pg_timeout");
    engine.store().provision_wallet(&owner, 100).await.unwrap();

    let mut holder = engine.store().begin().await.unwrap();
    holder.lock_wallet(&owner).await.unwrap().unwrap();

    assert!(matches!(
        engine.withdraw(&owner, "k", 10).await,
        Err(LedgerError::Store(StoreError::Timeout(_)))
    ));

    holder.rollback().await.unwrap();
    engine.withdraw(&owner, "k", 10).await.unwrap();
    assert_eq!(engine.get_wallet(&owner).await.unwrap().balance, 90);
}

#[tokio::test]
#[serial]
async fn test_ledger_rows_are_append_only() {
    let Some(store) = setup_store().await else {
        return;
    };
    let owner = unique_owner("pg_append_only");
    store.provision_wallet(&owner, 0).await.unwrap();
    let engine = LedgerEngine::new(store, MemoryIdempotencyCache::new(), EngineConfig::default());
    let tx_id = engine.deposit(&owner, "k", 5).await.unwrap();

    let result = sqlx::query("UPDATE transactions SET amount = 1 WHERE id = $1")
        .bind(tx_id)
        .execute(engine.store().pool())
        .await;

    assert!(result.is_err());
}
