//! Audit event system — decoupled observation of the turn pipeline.
//!
//! Events are published when something notable happens in the system.
//! Subscribers (the ops-chat reporter, tests) react without the pipeline
//! knowing they exist; publishing with no subscribers is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All audit events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuditEvent {
    /// A user message entered the pipeline
    UserInput {
        user_id: String,
        sender_name: Option<String>,
        content: String,
        timestamp: DateTime<Utc>,
    },

    /// A user was seen for the first time (no stored record)
    NewUser {
        user_id: String,
        sender_name: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    SystemError {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for audit events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Components can subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<AuditEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AuditEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AuditEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(AuditEvent::UserInput {
            user_id: "42".into(),
            sender_name: Some("Alice".into()),
            content: "hello".into(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            AuditEvent::UserInput { user_id, content, .. } => {
                assert_eq!(user_id, "42");
                assert_eq!(content, "hello");
            }
            _ => panic!("Expected UserInput event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        // Publishing with no subscribers should not panic
        bus.publish(AuditEvent::SystemError {
            context: "test".into(),
            error_message: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
