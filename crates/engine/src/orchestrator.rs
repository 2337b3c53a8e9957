//! The turn orchestrator — one inbound message in, one reply out.

use crate::enrich::EnrichmentPipeline;
use crate::gate::UserGate;
use crate::history::HistoryManager;
use crate::verify::VerificationDetector;
use chrono::Utc;
use palaver_core::event::{AuditEvent, EventBus};
use palaver_core::generator::{GenerationRequest, Generator};
use palaver_core::session::Role;
use palaver_core::transport::InboundMessage;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// The outcome of one turn, ready for transport delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Text to deliver to the user
    pub text: String,

    /// Where the text came from
    pub disposition: ReplyDisposition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyDisposition {
    /// The generation backend produced the reply
    Generated,

    /// The backend failed; the fixed fallback reply was used
    Fallback,
}

/// Drives every inbound message through the same pipeline: load history,
/// classify, enrich, dispatch, persist, reply.
///
/// One orchestrator serves all users. Turns for the same user are serialized
/// through the per-user gate; turns for different users share nothing and
/// run in parallel. A turn always produces a reply: backend failure yields
/// the fixed fallback, and every other failure is absorbed along the way.
pub struct TurnOrchestrator {
    /// Session load/append/save, including the history bound and TTL
    history: HistoryManager,

    /// Unlock-token detection over persisted user turns
    detector: VerificationDetector,

    /// Ephemeral context construction for the outbound payload
    enrichment: EnrichmentPipeline,

    /// The generation backend
    generator: Arc<dyn Generator>,

    /// Per-user mutual exclusion from load through save
    gate: UserGate,

    /// Audit event sink
    event_bus: Arc<EventBus>,

    /// Maximum tokens per generated reply
    max_tokens: u32,

    /// Sampling temperature
    temperature: f32,

    /// Delivered verbatim when the backend fails
    fallback_reply: String,
}

impl TurnOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        history: HistoryManager,
        detector: VerificationDetector,
        enrichment: EnrichmentPipeline,
        generator: Arc<dyn Generator>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            history,
            detector,
            enrichment,
            generator,
            gate: UserGate::new(),
            event_bus,
            max_tokens: 600,
            temperature: 0.7,
            fallback_reply: "Connection unstable right now. Please try again in a moment.".into(),
        }
    }

    /// Set the token budget per generated reply.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the reply delivered when the generation backend fails.
    pub fn with_fallback_reply(mut self, reply: impl Into<String>) -> Self {
        self.fallback_reply = reply.into();
        self
    }

    /// Run one full turn.
    ///
    /// Persistence completes before this returns; delivering the reply is
    /// the transport's concern. The payload sent to the backend is ordered
    /// pinned instruction first, persisted history next, ephemeral context
    /// entries after that, and the current user message last.
    pub async fn handle(&self, inbound: &InboundMessage) -> TurnReply {
        let turn_id = Uuid::new_v4();
        info!(turn_id = %turn_id, user_id = %inbound.user_id, "Turn received");

        self.event_bus.publish(AuditEvent::UserInput {
            user_id: inbound.user_id.0.clone(),
            sender_name: inbound.sender_name.clone(),
            content: inbound.text.clone(),
            timestamp: Utc::now(),
        });

        // ── Per-user serialization ──
        let _gate = self.gate.acquire(&inbound.user_id).await;

        // ── History load ──
        let (mut record, first_contact) = self.history.load(&inbound.user_id).await;
        if first_contact {
            info!(turn_id = %turn_id, user_id = %inbound.user_id, "First contact, session created");
            self.event_bus.publish(AuditEvent::NewUser {
                user_id: inbound.user_id.0.clone(),
                sender_name: inbound.sender_name.clone(),
                timestamp: Utc::now(),
            });
        }

        // ── Enrichment ──
        let state = self.detector.classify(&record);
        let context = self.enrichment.build(&inbound.text, state).await;
        debug!(
            turn_id = %turn_id,
            entries = context.len(),
            verification = %state,
            "Context assembled"
        );
        record.turns.extend(context);
        self.history.append_turn(&mut record, Role::User, &inbound.text);

        // ── Generation ──
        let request = GenerationRequest {
            messages: record.turns.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let reply = match self.generator.generate(request).await {
            Ok(text) => {
                debug!(turn_id = %turn_id, chars = text.len(), "Generation succeeded");
                self.history.append_turn(&mut record, Role::Assistant, &text);
                TurnReply {
                    text,
                    disposition: ReplyDisposition::Generated,
                }
            }
            Err(e) => {
                warn!(turn_id = %turn_id, error = %e, "Generation failed, using fallback reply");
                self.event_bus.publish(AuditEvent::SystemError {
                    context: "generation".into(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                TurnReply {
                    text: self.fallback_reply.clone(),
                    disposition: ReplyDisposition::Fallback,
                }
            }
        };

        // ── Persistence ──
        // The user's turn is saved even when generation failed; only a
        // successful attempt records an assistant turn.
        if let Err(e) = self.history.save(&mut record).await {
            warn!(
                turn_id = %turn_id,
                user_id = %inbound.user_id,
                error = %e,
                "Session save failed, turn not persisted"
            );
            self.event_bus.publish(AuditEvent::SystemError {
                context: "persistence".into(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
        }

        info!(turn_id = %turn_id, disposition = ?reply.disposition, "Turn complete");
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use palaver_core::error::{GenerationError, StoreError};
    use palaver_core::session::{Message, UserId};
    use palaver_core::store::SessionStore;
    use palaver_store::InMemoryStore;
    use std::time::Duration;
    use tokio::sync::Mutex;

    const INSTRUCTION: &str = "You are a helpful assistant.";
    const FALLBACK: &str = "Connection unstable right now. Please try again in a moment.";

    /// A generator that returns a fixed reply and records each request.
    struct ScriptedGenerator {
        reply: Result<String, GenerationError>,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(error: GenerationError) -> Self {
            Self {
                reply: Err(error),
                requests: Mutex::new(Vec::new()),
            }
        }

        async fn last_request(&self) -> GenerationRequest {
            self.requests.lock().await.last().cloned().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Generator for ScriptedGenerator {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
            self.requests.lock().await.push(request);
            self.reply.clone()
        }
    }

    /// A search backend that never finds anything.
    struct EmptySearch;

    #[async_trait::async_trait]
    impl palaver_core::search::SearchBackend for EmptySearch {
        fn name(&self) -> &str {
            "empty"
        }

        async fn lookup(
            &self,
            _query: &str,
            _max_results: usize,
        ) -> Result<Option<String>, palaver_core::error::SearchError> {
            Ok(None)
        }
    }

    /// A store whose reads succeed (empty) but whose writes always fail.
    struct WriteFailingStore;

    #[async_trait::async_trait]
    impl SessionStore for WriteFailingStore {
        fn name(&self) -> &str {
            "write-failing"
        }

        async fn get(&self, _user_id: &UserId) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        async fn put(
            &self,
            _user_id: &UserId,
            _bytes: &[u8],
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("disk full".into()))
        }
    }

    fn orchestrator(
        store: Arc<dyn SessionStore>,
        generator: Arc<ScriptedGenerator>,
        event_bus: Arc<EventBus>,
    ) -> TurnOrchestrator {
        let history = HistoryManager::new(store, INSTRUCTION, 20, Duration::from_secs(3600));
        let detector = VerificationDetector::new("sesame");
        let enrichment = EnrichmentPipeline::new(Arc::new(EmptySearch));
        TurnOrchestrator::new(history, detector, enrichment, generator, event_bus)
            .with_max_tokens(600)
            .with_temperature(0.7)
            .with_fallback_reply(FALLBACK)
    }

    fn inbound(user_id: &str, text: &str) -> InboundMessage {
        InboundMessage {
            user_id: UserId::from(user_id),
            chat_id: user_id.into(),
            sender_name: Some("Alice".into()),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn successful_turn_replies_and_persists() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::replying("Hi! How can I help?"));
        let orch = orchestrator(store.clone(), generator.clone(), Arc::new(EventBus::default()));

        let reply = orch.handle(&inbound("42", "hello")).await;

        assert_eq!(reply.text, "Hi! How can I help?");
        assert_eq!(reply.disposition, ReplyDisposition::Generated);

        let bytes = store.get(&UserId::from("42")).await.unwrap().unwrap();
        let turns: Vec<Message> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::System);
        assert_eq!(turns[1].content, "hello");
        assert_eq!(turns[2].content, "Hi! How can I help?");
    }

    #[tokio::test]
    async fn payload_is_ordered_pinned_history_context_user() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::replying("ok"));
        let orch = orchestrator(store, generator.clone(), Arc::new(EventBus::default()));

        orch.handle(&inbound("42", "first question")).await;
        orch.handle(&inbound("42", "second question")).await;

        let request = generator.last_request().await;
        let roles: Vec<_> = request.messages.iter().map(|m| (&m.role, m.ephemeral)).collect();
        assert_eq!(
            roles,
            vec![
                (&Role::System, false),    // pinned instruction
                (&Role::User, false),      // first question
                (&Role::Assistant, false), // first reply
                (&Role::System, true),     // temporal grounding
                (&Role::User, false),      // second question
            ]
        );
        assert_eq!(request.messages[0].content, INSTRUCTION);
        assert_eq!(request.messages.last().unwrap().content, "second question");
        assert_eq!(request.max_tokens, 600);
    }

    #[tokio::test]
    async fn generation_failure_falls_back_and_keeps_user_turn() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::failing(GenerationError::Timeout(
            "deadline exceeded".into(),
        )));
        let orch = orchestrator(store.clone(), generator, Arc::new(EventBus::default()));

        let reply = orch.handle(&inbound("42", "hello")).await;

        assert_eq!(reply.text, FALLBACK);
        assert_eq!(reply.disposition, ReplyDisposition::Fallback);

        // The user's message is persisted, but no assistant turn is.
        let bytes = store.get(&UserId::from("42")).await.unwrap().unwrap();
        let turns: Vec<Message> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1].role, Role::User);
        assert_eq!(turns[1].content, "hello");
    }

    #[tokio::test]
    async fn first_contact_publishes_new_user_once() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::replying("ok"));
        let event_bus = Arc::new(EventBus::default());
        let mut rx = event_bus.subscribe();
        let orch = orchestrator(store, generator, event_bus);

        orch.handle(&inbound("42", "hello")).await;
        orch.handle(&inbound("42", "hello again")).await;

        let mut new_user_events = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event.as_ref(), AuditEvent::NewUser { .. }) {
                new_user_events += 1;
            }
        }
        assert_eq!(new_user_events, 1);
    }

    #[tokio::test]
    async fn every_turn_publishes_user_input() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::replying("ok"));
        let event_bus = Arc::new(EventBus::default());
        let mut rx = event_bus.subscribe();
        let orch = orchestrator(store, generator, event_bus);

        orch.handle(&inbound("42", "the message")).await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            AuditEvent::UserInput {
                user_id,
                sender_name,
                content,
                ..
            } => {
                assert_eq!(user_id, "42");
                assert_eq!(sender_name.as_deref(), Some("Alice"));
                assert_eq!(content, "the message");
            }
            other => panic!("Expected UserInput first, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_failure_publishes_system_error() {
        let store = Arc::new(InMemoryStore::new());
        let generator = Arc::new(ScriptedGenerator::failing(GenerationError::Network(
            "connection reset".into(),
        )));
        let event_bus = Arc::new(EventBus::default());
        let mut rx = event_bus.subscribe();
        let orch = orchestrator(store, generator, event_bus);

        orch.handle(&inbound("42", "hello")).await;

        let mut saw_error = false;
        while let Ok(event) = rx.try_recv() {
            if let AuditEvent::SystemError { context, error_message, .. } = event.as_ref() {
                assert_eq!(context, "generation");
                assert!(error_message.contains("connection reset"));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[tokio::test]
    async fn save_failure_still_delivers_the_reply() {
        let generator = Arc::new(ScriptedGenerator::replying("made it"));
        let event_bus = Arc::new(EventBus::default());
        let mut rx = event_bus.subscribe();
        let orch = orchestrator(Arc::new(WriteFailingStore), generator, event_bus);

        let reply = orch.handle(&inbound("42", "hello")).await;

        assert_eq!(reply.text, "made it");
        assert_eq!(reply.disposition, ReplyDisposition::Generated);

        let mut saw_persistence_error = false;
        while let Ok(event) = rx.try_recv() {
            if let AuditEvent::SystemError { context, .. } = event.as_ref() {
                if context == "persistence" {
                    saw_persistence_error = true;
                }
            }
        }
        assert!(saw_persistence_error);
    }
}
