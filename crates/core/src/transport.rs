//! Transport trait — the abstraction over chat platforms.
//!
//! A Transport connects Palaver to a messaging platform. It receives messages
//! from users and sends replies back. The engine never talks to a platform
//! API directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::TransportError;
use crate::session::UserId;

/// A message received from a transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable platform identifier for the sender
    pub user_id: UserId,

    /// The chat to reply into (DM or group, platform-specific)
    pub chat_id: String,

    /// Human-readable sender name (if the platform provides one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,

    /// The text content
    pub text: String,
}

/// The core Transport trait.
///
/// Implementations handle platform-specific connection logic, polling, and
/// delivery. Incoming traffic is handed over through an mpsc receiver; the
/// runner decides what to do with each message.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name (e.g., "telegram").
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    ///
    /// Returns a receiver that yields incoming messages. Per-message failures
    /// (malformed updates, transient poll errors) are yielded as `Err` items
    /// so the runner can log them without the stream ending.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundMessage, TransportError>>,
        TransportError,
    >;

    /// Send a reply to a specific chat.
    async fn send(&self, chat_id: &str, text: &str) -> std::result::Result<(), TransportError>;

    /// Send a typing indicator (if the platform supports it).
    async fn send_typing(&self, _chat_id: &str) -> std::result::Result<(), TransportError> {
        Ok(()) // No-op default
    }

    /// Stop the transport gracefully.
    async fn stop(&self) -> std::result::Result<(), TransportError> {
        Ok(())
    }

    /// Health check — is the transport connected and operational?
    async fn health_check(&self) -> std::result::Result<bool, TransportError> {
        Ok(true)
    }
}
