//! Error types for the Palaver domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Palaver operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Session store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Generation backend errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Search backend errors ---
    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Session store failures.
///
/// Callers treat a read failure as "no stored record" and a write failure as
/// fatal to persistence but not to the reply. Neither is retried inline.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    #[error("session record encoding failed: {0}")]
    Codec(String),
}

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Request(String),

    #[error("Search response malformed: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed to {chat_id}: {reason}")]
    DeliveryFailed { chat_id: String, reason: String },

    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid update payload: {0}")]
    InvalidPayload(String),
}
