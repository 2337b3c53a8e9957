//! Audit reporter — forwards pipeline events to an ops chat.
//!
//! Subscribes to the audit event bus and relays each event through a
//! `Transport` to a configured chat. Runs as a detached task so delivery
//! failures never reach the turn pipeline.

use palaver_core::event::{AuditEvent, EventBus};
use palaver_core::transport::Transport;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Relays audit events to a dedicated ops chat.
pub struct AuditReporter {
    transport: Arc<dyn Transport>,
    chat_id: String,
}

impl AuditReporter {
    pub fn new(transport: Arc<dyn Transport>, chat_id: impl Into<String>) -> Self {
        Self {
            transport,
            chat_id: chat_id.into(),
        }
    }

    /// Spawn the forwarding loop. The task ends when the event bus is
    /// dropped; a failed delivery is logged and the loop keeps going.
    pub fn spawn(self, bus: &EventBus) -> JoinHandle<()> {
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let text = format_event(event.as_ref());
                        if let Err(e) = self.transport.send(&self.chat_id, &text).await {
                            warn!(error = %e, "Audit report delivery failed");
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Audit reporter fell behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Audit reporter stopped");
        })
    }
}

/// Render an event as an ops-chat message.
fn format_event(event: &AuditEvent) -> String {
    match event {
        AuditEvent::UserInput {
            user_id,
            sender_name,
            content,
            ..
        } => {
            let name = sender_name.as_deref().unwrap_or("unknown");
            format!("USER INPUT\n{name} ({user_id})\n{content}")
        }
        AuditEvent::NewUser {
            user_id,
            sender_name,
            ..
        } => {
            let name = sender_name.as_deref().unwrap_or("unknown");
            format!("NEW USER\n{name} ({user_id})")
        }
        AuditEvent::SystemError {
            context,
            error_message,
            ..
        } => {
            format!("SYSTEM ERROR [{context}]\n{error_message}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use palaver_core::error::TransportError;
    use palaver_core::transport::InboundMessage;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingTransport {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start(
            &self,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<InboundMessage, TransportError>>,
            TransportError,
        > {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(
            &self,
            chat_id: &str,
            text: &str,
        ) -> std::result::Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            if self.fail {
                return Err(TransportError::DeliveryFailed {
                    chat_id: chat_id.to_string(),
                    reason: "down".into(),
                });
            }
            Ok(())
        }
    }

    fn user_input(user_id: &str, name: Option<&str>, content: &str) -> AuditEvent {
        AuditEvent::UserInput {
            user_id: user_id.into(),
            sender_name: name.map(String::from),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn user_input_format() {
        let text = format_event(&user_input("42", Some("Alice"), "hello"));
        assert_eq!(text, "USER INPUT\nAlice (42)\nhello");
    }

    #[test]
    fn unnamed_sender_format() {
        let text = format_event(&user_input("42", None, "hi"));
        assert!(text.contains("unknown (42)"));
    }

    #[test]
    fn new_user_format() {
        let text = format_event(&AuditEvent::NewUser {
            user_id: "7".into(),
            sender_name: Some("Bob".into()),
            timestamp: Utc::now(),
        });
        assert_eq!(text, "NEW USER\nBob (7)");
    }

    #[test]
    fn system_error_format() {
        let text = format_event(&AuditEvent::SystemError {
            context: "generation".into(),
            error_message: "upstream 503".into(),
            timestamp: Utc::now(),
        });
        assert_eq!(text, "SYSTEM ERROR [generation]\nupstream 503");
    }

    #[tokio::test]
    async fn forwards_events_to_the_ops_chat() {
        let transport = Arc::new(RecordingTransport::new());
        let bus = EventBus::new(16);
        let handle = AuditReporter::new(transport.clone(), "-100999").spawn(&bus);

        bus.publish(user_input("42", Some("Alice"), "hello"));
        bus.publish(AuditEvent::NewUser {
            user_id: "42".into(),
            sender_name: Some("Alice".into()),
            timestamp: Utc::now(),
        });

        // Dropping the bus closes the channel; the loop drains what is
        // buffered and exits.
        drop(bus);
        handle.await.unwrap();

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "-100999");
        assert!(sent[0].1.contains("USER INPUT"));
        assert!(sent[1].1.contains("NEW USER"));
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_loop() {
        let transport = Arc::new(RecordingTransport::failing());
        let bus = EventBus::new(16);
        let handle = AuditReporter::new(transport.clone(), "ops").spawn(&bus);

        bus.publish(user_input("1", None, "first"));
        bus.publish(user_input("2", None, "second"));

        drop(bus);
        handle.await.unwrap();

        // Both deliveries were attempted despite the first failing.
        assert_eq!(transport.sent().len(), 2);
    }
}
