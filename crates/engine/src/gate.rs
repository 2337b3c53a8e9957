//! Per-user turn serialization.
//!
//! The history load/append/save cycle is not safe under interleaving: two
//! rapid messages from one user could each load the same record and the
//! second save would erase the first turn. The gate hands out one mutex per
//! user id, held from load through save, while turns for different users
//! proceed in parallel. Entries nobody holds or waits on are pruned so the
//! map does not grow with every user ever seen.

use palaver_core::session::UserId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Default)]
pub struct UserGate {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the gate for one user, waiting behind any in-flight turn.
    ///
    /// Dropping the returned guard releases the next queued turn for that
    /// user.
    pub async fn acquire(&self, user_id: &UserId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut slots = self.slots.lock().await;
            // A count of 1 means only the map still references the slot:
            // no guard is held and nobody is queued on it.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots
                .entry(user_id.0.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.slots.lock().await.len()
    }
}
