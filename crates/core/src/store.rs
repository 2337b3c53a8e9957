//! Session store trait — TTL'd key/value persistence for session records.
//!
//! The store sees opaque bytes; record shape belongs to the history layer.
//! Every write carries the full TTL so that expiry slides on activity: an
//! idle user's record eventually vanishes, an active user's never does.

use async_trait::async_trait;
use std::time::Duration;
use crate::error::StoreError;
use crate::session::UserId;

/// The core SessionStore trait.
///
/// Implementations: Redis (production), in-memory (testing and dev runs).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "redis", "memory").
    fn name(&self) -> &str;

    /// Fetch the stored record bytes for a user, if any.
    ///
    /// `Ok(None)` means no record exists (first contact or TTL expiry).
    async fn get(&self, user_id: &UserId) -> std::result::Result<Option<Vec<u8>>, StoreError>;

    /// Store record bytes for a user, resetting the TTL to its full span.
    async fn put(
        &self,
        user_id: &UserId,
        bytes: &[u8],
        ttl: Duration,
    ) -> std::result::Result<(), StoreError>;

    /// Health check — can the store be reached?
    async fn health_check(&self) -> std::result::Result<bool, StoreError> {
        Ok(true)
    }
}
