//! Redis-backed session store — the production backend.
//!
//! One record per user under `session:<user_id>`, written with SETEX so every
//! save resets the TTL. The engine treats any Redis failure as the store
//! being unavailable; connectivity and retry policy stay out of the turn path.

use ::redis::AsyncCommands;
use async_trait::async_trait;
use palaver_core::error::StoreError;
use palaver_core::session::UserId;
use palaver_core::store::SessionStore;
use std::time::Duration;
use tracing::debug;

/// A session store backed by a Redis server.
///
/// Holds a multiplexed connection; clones of it share one TCP stream, so the
/// store itself is cheap to share across tasks.
pub struct RedisStore {
    conn: ::redis::aio::MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            ::redis::Client::open(url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        debug!("Redis session store connected");
        Ok(Self { conn })
    }

    fn key(user_id: &UserId) -> String {
        format!("session:{user_id}")
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let bytes: Option<Vec<u8>> = conn
            .get(Self::key(user_id))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(bytes)
    }

    async fn put(&self, user_id: &UserId, bytes: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // SETEX rejects a zero expiry
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(Self::key(user_id), bytes, ttl_secs)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let pong: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(pong == "PONG")
    }
}
