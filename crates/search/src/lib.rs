//! Search backend implementations for Palaver.
//!
//! All backends implement the `palaver_core::SearchBackend` trait. The
//! enrichment pipeline treats search as best-effort; backends report errors,
//! the pipeline decides to swallow them.

pub mod duckduckgo;
pub mod noop;

pub use duckduckgo::DuckDuckGoSearch;
pub use noop::NoSearch;
