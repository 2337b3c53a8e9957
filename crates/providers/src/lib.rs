//! Text-generation backend implementations for Palaver.
//!
//! All backends implement the `palaver_core::Generator` trait. The engine
//! dispatches to whichever backend the runner wired in.

pub mod chat_completions;

pub use chat_completions::ChatCompletionsClient;
