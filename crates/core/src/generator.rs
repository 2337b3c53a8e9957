//! Generator trait — the abstraction over text-generation backends.
//!
//! A Generator receives the fully assembled, ordered payload for one turn and
//! returns the generated text. It holds no per-user state; the engine owns
//! sessions, the generator sees only what it is handed.
//!
//! Implementations: OpenAI-compatible chat-completions endpoints.

use async_trait::async_trait;
use crate::error::GenerationError;
use crate::session::Message;

/// One generation call: the ordered payload plus sampling knobs.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Ordered `(role, content)` entries, pinned instruction first,
    /// current user message last
    pub messages: Vec<Message>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,
}

/// The core Generator trait.
///
/// The turn pipeline calls `generate()` without knowing which backend is in
/// use. Any error surfaces to the caller, which owns the fallback policy.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this backend (e.g., "chat-completions").
    fn name(&self) -> &str;

    /// Send the payload and return the generated text.
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<String, GenerationError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, GenerationError> {
        Ok(true)
    }
}
