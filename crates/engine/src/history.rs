//! Conversation history — load, bound, and persist one user's turns.
//!
//! The manager owns the record shape end to end: what stored bytes
//! deserialize into, which entries survive a trim, and what reaches the
//! store. Nothing else in the system writes session state.

use palaver_core::error::StoreError;
use palaver_core::session::{Message, Role, SessionRecord, UserId};
use palaver_core::store::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Manages conversation records on top of a [`SessionStore`].
///
/// Reads degrade: a missing, unreadable, or corrupt record becomes a fresh
/// one seeded with the pinned instruction entry, so store trouble never
/// blocks a user's turn. Write errors propagate to the caller, which owns
/// the failure policy.
pub struct HistoryManager {
    store: Arc<dyn SessionStore>,

    /// Instruction text seeded as `turns[0]` of every fresh record
    instruction: String,

    /// Upper bound on persisted turns, pinned entry included
    max_history: usize,

    /// Full TTL applied on every save (sliding expiry)
    ttl: Duration,
}

impl HistoryManager {
    /// Create a new history manager.
    pub fn new(
        store: Arc<dyn SessionStore>,
        instruction: impl Into<String>,
        max_history: usize,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            instruction: instruction.into(),
            max_history,
            ttl,
        }
    }

    /// Load a user's record.
    ///
    /// Returns the record and whether this is first contact, i.e. no usable
    /// stored record existed. A read failure or a record that fails to
    /// deserialize is logged and treated as first contact rather than
    /// propagated.
    pub async fn load(&self, user_id: &UserId) -> (SessionRecord, bool) {
        let stored = match self.store.get(user_id).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Session read failed, starting fresh");
                None
            }
        };

        let Some(bytes) = stored else {
            return (self.fresh(user_id), true);
        };

        match serde_json::from_slice::<Vec<Message>>(&bytes) {
            Ok(turns) if !turns.is_empty() => {
                debug!(user_id = %user_id, turns = turns.len(), "Session loaded");
                let record = SessionRecord {
                    user_id: user_id.clone(),
                    turns,
                };
                (record, false)
            }
            // An empty list carries no pinned entry; reseed
            Ok(_) => (self.fresh(user_id), true),
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Stored session is corrupt, starting fresh");
                (self.fresh(user_id), true)
            }
        }
    }

    /// Append a durable turn.
    pub fn append_turn(&self, record: &mut SessionRecord, role: Role, content: impl Into<String>) {
        record.turns.push(Message {
            role,
            content: content.into(),
            ephemeral: false,
        });
    }

    /// Append an in-flight context entry that will not survive the next save.
    pub fn append_ephemeral(&self, record: &mut SessionRecord, content: impl Into<String>) {
        record.turns.push(Message::ephemeral_system(content));
    }

    /// Bound a record in place.
    ///
    /// Ephemeral entries go first, unconditionally. The pinned entry always
    /// survives. Beyond it the most recent turns are kept up to the
    /// configured bound, oldest evicted first. A bound below 2 degrades to
    /// keeping the pinned entry alone.
    pub fn trim(&self, record: &mut SessionRecord) {
        record.turns.retain(|m| !m.ephemeral);

        let reserved = usize::from(record.pinned().is_some());
        let budget = self.max_history.saturating_sub(reserved);
        let tail = record.turns.len() - reserved;
        if tail > budget {
            let excess = tail - budget;
            record.turns.drain(reserved..reserved + excess);
        }
    }

    /// Persist a record: strip ephemerals, bound the history, serialize,
    /// write with the full TTL.
    ///
    /// The stored layout is exactly the ordered `{role, content}` list. The
    /// record is left in its post-trim state for the caller.
    pub async fn save(&self, record: &mut SessionRecord) -> Result<(), StoreError> {
        self.trim(record);
        let bytes =
            serde_json::to_vec(&record.turns).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.store.put(&record.user_id, &bytes, self.ttl).await?;
        debug!(user_id = %record.user_id, turns = record.len(), "Session saved");
        Ok(())
    }

    fn fresh(&self, user_id: &UserId) -> SessionRecord {
        SessionRecord::fresh(user_id.clone(), self.instruction.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_store::InMemoryStore;

    const INSTRUCTION: &str = "You are a helpful assistant.";

    fn manager(store: Arc<dyn SessionStore>, max_history: usize) -> HistoryManager {
        HistoryManager::new(store, INSTRUCTION, max_history, Duration::from_secs(3600))
    }

    fn record_with_turns(pairs: usize) -> SessionRecord {
        let mut record = SessionRecord::fresh(UserId::from("7"), INSTRUCTION);
        for i in 0..pairs {
            record.turns.push(Message::user(format!("question {i}")));
            record.turns.push(Message::assistant(format!("answer {i}")));
        }
        record
    }

    #[test]
    fn trim_keeps_pinned_and_most_recent() {
        let mgr = manager(Arc::new(InMemoryStore::new()), 4);
        let mut record = record_with_turns(3); // pinned + 6

        mgr.trim(&mut record);

        assert_eq!(record.len(), 4);
        assert_eq!(record.turns[0].content, INSTRUCTION);
        assert_eq!(record.turns[1].content, "answer 1");
        assert_eq!(record.turns[2].content, "question 2");
        assert_eq!(record.turns[3].content, "answer 2");
    }

    #[test]
    fn trim_drops_ephemerals_before_anything_else() {
        let mgr = manager(Arc::new(InMemoryStore::new()), 10);
        let mut record = record_with_turns(1);
        record.turns.push(Message::ephemeral_system("Current time: now"));
        record.turns.push(Message::user("latest question"));

        mgr.trim(&mut record);

        assert!(record.turns.iter().all(|m| !m.ephemeral));
        assert_eq!(record.len(), 4); // pinned + q/a pair + latest question
    }

    #[test]
    fn degraded_bound_never_drops_pinned() {
        for bound in [0, 1] {
            let mgr = manager(Arc::new(InMemoryStore::new()), bound);
            let mut record = record_with_turns(2);

            mgr.trim(&mut record);

            assert_eq!(record.len(), 1, "bound {bound} must leave the pinned entry");
            assert_eq!(record.turns[0].role, Role::System);
        }
    }

    #[test]
    fn trim_without_pinned_entry_bounds_plainly() {
        let mgr = manager(Arc::new(InMemoryStore::new()), 2);
        let mut record = SessionRecord {
            user_id: UserId::from("7"),
            turns: vec![
                Message::user("one"),
                Message::assistant("two"),
                Message::user("three"),
            ],
        };

        mgr.trim(&mut record);

        assert_eq!(record.len(), 2);
        assert_eq!(record.turns[0].content, "two");
    }

    #[tokio::test]
    async fn load_missing_record_is_first_contact() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store, 20);

        let (record, first_contact) = mgr.load(&UserId::from("42")).await;

        assert!(first_contact);
        assert_eq!(record.len(), 1);
        assert_eq!(record.pinned().unwrap().content, INSTRUCTION);
    }

    #[tokio::test]
    async fn load_corrupt_record_starts_fresh() {
        let store = Arc::new(InMemoryStore::new());
        let user = UserId::from("42");
        store
            .put(&user, b"{not json", Duration::from_secs(60))
            .await
            .unwrap();
        let mgr = manager(store, 20);

        let (record, first_contact) = mgr.load(&user).await;

        assert!(first_contact);
        assert_eq!(record.len(), 1);
    }

    #[tokio::test]
    async fn save_strips_ephemerals_and_roundtrips() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store.clone(), 20);
        let user = UserId::from("42");

        let (mut record, _) = mgr.load(&user).await;
        mgr.append_ephemeral(&mut record, "Current time: 2026-08-23 10:00");
        mgr.append_turn(&mut record, Role::User, "hello");
        mgr.append_turn(&mut record, Role::Assistant, "hi there");
        mgr.save(&mut record).await.unwrap();

        let (reloaded, first_contact) = mgr.load(&user).await;
        assert!(!first_contact);
        assert_eq!(reloaded.len(), 3);
        assert!(reloaded.turns.iter().all(|m| !m.ephemeral));
        assert_eq!(reloaded.turns[1].content, "hello");
        assert_eq!(reloaded.turns[2].content, "hi there");
    }

    #[tokio::test]
    async fn save_enforces_bound_on_disk() {
        let store = Arc::new(InMemoryStore::new());
        let mgr = manager(store.clone(), 4);
        let user = UserId::from("42");

        let (mut record, _) = mgr.load(&user).await;
        for i in 0..5 {
            mgr.append_turn(&mut record, Role::User, format!("msg {i}"));
            mgr.append_turn(&mut record, Role::Assistant, format!("reply {i}"));
            mgr.save(&mut record).await.unwrap();
        }

        let (reloaded, _) = mgr.load(&user).await;
        assert_eq!(reloaded.len(), 4);
        assert_eq!(reloaded.pinned().unwrap().content, INSTRUCTION);
        assert_eq!(reloaded.turns[3].content, "reply 4");
    }

    struct FailingStore;

    #[async_trait::async_trait]
    impl SessionStore for FailingStore {
        fn name(&self) -> &str {
            "failing"
        }

        async fn get(&self, _user_id: &UserId) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn put(
            &self,
            _user_id: &UserId,
            _bytes: &[u8],
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn read_failure_degrades_to_fresh_record() {
        let mgr = manager(Arc::new(FailingStore), 20);

        let (record, first_contact) = mgr.load(&UserId::from("42")).await;

        assert!(first_contact);
        assert_eq!(record.pinned().unwrap().content, INSTRUCTION);
    }

    #[tokio::test]
    async fn write_failure_surfaces_to_caller() {
        let mgr = manager(Arc::new(FailingStore), 20);
        let mut record = SessionRecord::fresh(UserId::from("42"), INSTRUCTION);

        let err = mgr.save(&mut record).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
