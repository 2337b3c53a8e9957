//! The conversation engine — the heart of Palaver.
//!
//! Every inbound message runs through the same turn pipeline:
//!
//! 1. **Load** the user's conversation record from the session store
//! 2. **Classify** the verification state from persisted user turns
//! 3. **Enrich** with ephemeral context (temporal grounding, optional
//!    fact retrieval)
//! 4. **Dispatch** the assembled payload to the generation backend
//! 5. **Persist** the durable turns (ephemeral entries stripped, history
//!    bounded) under a sliding TTL
//! 6. **Reply** with the generated text, or a fixed fallback on failure
//!
//! Turns for different users run fully in parallel; turns for the same
//! user are serialized through a per-user gate so the load/append/save
//! cycle never interleaves.

pub mod enrich;
pub mod gate;
pub mod history;
pub mod orchestrator;
pub mod verify;

pub use enrich::EnrichmentPipeline;
pub use gate::UserGate;
pub use history::HistoryManager;
pub use orchestrator::{ReplyDisposition, TurnOrchestrator, TurnReply};
pub use verify::VerificationDetector;
