//! In-memory session store — useful for testing and dev runs without Redis.
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can drive TTL
//! behavior deterministically.

use async_trait::async_trait;
use palaver_core::error::StoreError;
use palaver_core::session::UserId;
use palaver_core::store::SessionStore;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct StoredRecord {
    bytes: Vec<u8>,
    expires_at: Instant,
}

/// A session store that keeps records in a map. Expired records are dropped
/// lazily on the next read of their key.
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) records. Test helper.
    pub async fn live_len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|r| r.expires_at > now)
            .count()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(&user_id.0) {
                Some(record) if record.expires_at > now => {
                    return Ok(Some(record.bytes.clone()));
                }
                Some(_) => {} // expired, fall through to remove it
                None => return Ok(None),
            }
        }
        self.entries.write().await.remove(&user_id.0);
        Ok(None)
    }

    async fn put(&self, user_id: &UserId, bytes: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let record = StoredRecord {
            bytes: bytes.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        self.entries.write().await.insert(user_id.0.clone(), record);
        Ok(())
    }
}
