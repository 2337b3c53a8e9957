//! # Palaver Core
//!
//! Domain types, traits, and error definitions for the Palaver session engine.
//! This crate has **zero framework dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (session store, text generator, search backend,
//! chat transport) is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod generator;
pub mod search;
pub mod session;
pub mod store;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{AuditEvent, EventBus};
pub use generator::{GenerationRequest, Generator};
pub use search::SearchBackend;
pub use session::{Message, Role, SessionRecord, UserId, VerificationState};
pub use store::SessionStore;
pub use transport::{InboundMessage, Transport};
