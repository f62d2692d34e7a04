//! Redis-backed idempotency cache.

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::time::Duration;
use uuid::Uuid;

use super::{
    CacheConfig, CacheError, CacheResult, IdempotencyCache, IdempotencyKey, MAX_IDEMPOTENCY_TTL,
    parse_transaction_id,
};

/// Idempotency cache stored in Redis with `SET ... EX`
///
/// The connection manager reconnects on its own, so one instance is shared
/// by every request.
#[derive(Clone)]
pub struct RedisIdempotencyCache {
    conn: ConnectionManager,
}

impl RedisIdempotencyCache {
    /// Connect and verify the server answers `PING`
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        let cache = Self { conn };
        cache.ping().await?;
        Ok(cache)
    }
}

#[async_trait]
impl IdempotencyCache for RedisIdempotencyCache {
    async fn get(&self, key: &IdempotencyKey) -> CacheResult<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key.to_string()).await?;
        value.map(|v| parse_transaction_id(key, v)).transpose()
    }

    async fn set(
        &self,
        key: &IdempotencyKey,
        transaction_id: Uuid,
        ttl: Duration,
    ) -> CacheResult<()> {
        if ttl > MAX_IDEMPOTENCY_TTL {
            return Err(CacheError::InvalidTtl(ttl));
        }

        let mut conn = self.conn.clone();
        // EX 0 is rejected by Redis
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key.to_string(), transaction_id.to_string(), seconds)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
