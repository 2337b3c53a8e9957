//! Verification state — a pure classification over persisted user turns.

use palaver_core::session::{Role, SessionRecord, VerificationState};

/// Detects whether a session has been unlocked by its user.
///
/// The detector scans user-role turns for a configured token with a
/// case-insensitive substring match. State is derived from record content
/// alone on every call: appending further turns can only move
/// `Locked → Unlocked`, and nothing here mutates or stores anything.
pub struct VerificationDetector {
    /// Lowercased at construction; empty disables unlocking entirely
    token: String,
}

impl VerificationDetector {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.trim().to_lowercase(),
        }
    }

    /// Classify a record. O(total user content length).
    pub fn classify(&self, record: &SessionRecord) -> VerificationState {
        if self.token.is_empty() {
            return VerificationState::Locked;
        }

        let unlocked = record
            .turns
            .iter()
            .filter(|m| m.role == Role::User)
            .any(|m| m.content.to_lowercase().contains(&self.token));

        if unlocked {
            VerificationState::Unlocked
        } else {
            VerificationState::Locked
        }
    }
}
