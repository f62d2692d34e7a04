//! In-process idempotency cache with per-entry expiry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CacheError, CacheResult, IdempotencyCache, IdempotencyKey, MAX_IDEMPOTENCY_TTL};

/// In-memory idempotency cache for tests and single-node development
///
/// The `fail_reads`/`fail_writes` switches make the cache report itself
/// unavailable, for exercising the engine's failure paths.
#[derive(Clone, Default)]
pub struct MemoryIdempotencyCache {
    entries: Arc<RwLock<HashMap<String, (Uuid, Instant)>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryIdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Drop the entry for `key`, as if it had expired
    pub async fn evict(&self, key: &IdempotencyKey) {
        self.entries.write().await.remove(&key.to_string());
    }

    /// Remove expired entries and return how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - entries.len()
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl IdempotencyCache for MemoryIdempotencyCache {
    async fn get(&self, key: &IdempotencyKey) -> CacheResult<Option<Uuid>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("reads disabled".to_string()));
        }

        let rendered = key.to_string();
        let entry = self.entries.read().await.get(&rendered).copied();
        match entry {
            Some((id, expires_at)) if expires_at > Instant::now() => Ok(Some(id)),
            Some(_) => {
                self.entries.write().await.remove(&rendered);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &IdempotencyKey,
        transaction_id: Uuid,
        ttl: Duration,
    ) -> CacheResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("writes disabled".to_string()));
        }

        let expires_at = Instant::now()
            .checked_add(ttl)
            .filter(|_| ttl <= MAX_IDEMPOTENCY_TTL)
            .ok_or(CacheError::InvalidTtl(ttl))?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (transaction_id, expires_at));
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::TransactionKind;

    fn key(token: &str) -> IdempotencyKey {
        IdempotencyKey::new(TransactionKind::Deposit, "alice", token)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = MemoryIdempotencyCache::new();
        let id = Uuid::new_v4();

        assert_eq!(cache.get(&key("a")).await.unwrap(), None);
        cache.set(&key("a"), id, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(&key("a")).await.unwrap(), Some(id));
        assert_eq!(cache.get(&key("b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = MemoryIdempotencyCache::new();
        cache
            .set(&key("a"), Uuid::new_v4(), Duration::from_millis(20))
            .await
            .unwrap();
        cache
            .set(&key("b"), Uuid::new_v4(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get(&key("a")).await.unwrap(), None);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryIdempotencyCache::new();
        cache
            .set(&key("a"), Uuid::new_v4(), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(cache.purge_expired().await, 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let cache = MemoryIdempotencyCache::new();

        for ttl in [MAX_IDEMPOTENCY_TTL + Duration::from_secs(1), Duration::MAX] {
            assert!(matches!(
                cache.set(&key("a"), Uuid::new_v4(), ttl).await,
                Err(CacheError::InvalidTtl(d)) if d == ttl
            ));
        }
        assert!(cache.is_empty().await);

        cache
            .set(&key("a"), Uuid::new_v4(), MAX_IDEMPOTENCY_TTL)
            .await
            .unwrap();
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_fault_switches() {
        let cache = MemoryIdempotencyCache::new();

        cache.fail_writes(true);
        assert!(matches!(
            cache.set(&key("a"), Uuid::new_v4(), Duration::from_secs(1)).await,
            Err(CacheError::Unavailable(_))
        ));

        cache.fail_reads(true);
        assert!(matches!(cache.get(&key("a")).await, Err(CacheError::Unavailable(_))));
        assert!(cache.ping().await.is_err());

        cache.fail_reads(false);
        assert_eq!(cache.get(&key("a")).await.unwrap(), None);
    }
}
