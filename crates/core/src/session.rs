//! Session domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a user sends a message → the transport receives it → the engine loads the
//! user's session, enriches it, and dispatches it → the generator responds.

use serde::{Deserialize, Serialize};

/// Opaque stable identifier for an end user.
///
/// Platform-specific ids are carried as strings (Telegram numeric ids become
/// their decimal rendering). The store keys records by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Operator-supplied instructions and injected context
    System,
    /// The end user
    User,
    /// The generation backend
    Assistant,
}

/// A single utterance in a session.
///
/// The persisted layout is exactly `{role, content}` — `ephemeral` is a
/// runtime-only marker and never reaches storage. Entries read back from the
/// store therefore always deserialize as durable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who authored this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// True only for context entries injected for a single generation call
    #[serde(skip)]
    pub ephemeral: bool,
}

impl Message {
    /// Create a durable system entry.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            ephemeral: false,
        }
    }

    /// Create a user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ephemeral: false,
        }
    }

    /// Create an assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            ephemeral: false,
        }
    }

    /// Create an ephemeral system entry (in-flight context, never persisted).
    pub fn ephemeral_system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            ephemeral: true,
        }
    }
}

/// The durable unit of state for one user: an ordered, oldest-first list of
/// turns keyed by user id.
///
/// Invariants maintained by the history layer:
/// - `turns[0]`, when present, is the pinned instruction entry and survives
///   trimming for the record's lifetime.
/// - `turns.len()` never exceeds the configured history bound after a save.
/// - No ephemeral entry is ever saved.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: UserId,
    pub turns: Vec<Message>,
}

impl SessionRecord {
    /// Create a fresh record seeded with the pinned instruction entry.
    pub fn fresh(user_id: UserId, instruction: impl Into<String>) -> Self {
        Self {
            user_id,
            turns: vec![Message::system(instruction)],
        }
    }

    /// The pinned instruction entry, if the record still carries one.
    pub fn pinned(&self) -> Option<&Message> {
        self.turns
            .first()
            .filter(|m| m.role == Role::System && !m.ephemeral)
    }

    /// Number of turns currently held, ephemerals included.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Derived access state for a session. Computed every turn, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationState {
    /// Default state for every session
    Locked,
    /// Some historical user turn contained the unlock token
    Unlocked,
}

impl VerificationState {
    pub fn is_unlocked(&self) -> bool {
        matches!(self, VerificationState::Unlocked)
    }
}

impl std::fmt::Display for VerificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationState::Locked => write!(f, "locked"),
            VerificationState::Unlocked => write!(f, "unlocked"),
        }
    }
}
