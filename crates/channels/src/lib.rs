//! Chat platform transports for Palaver.
//!
//! Each transport connects the engine to a messaging platform and relays
//! messages in both directions. The audit reporter rides the same
//! `Transport` abstraction to forward pipeline events to an ops chat.

pub mod reporter;
pub mod telegram;

pub use reporter::AuditReporter;
pub use telegram::{TelegramConfig, TelegramTransport};
