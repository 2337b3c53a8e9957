//! Search backend trait — best-effort external fact lookup.
//!
//! Search is an enrichment source, never a dependency: the turn pipeline
//! treats every failure here as "no facts available" and proceeds. The trait
//! therefore distinguishes "nothing found" (`Ok(None)`) from transport-level
//! failure so callers can log the difference.

use async_trait::async_trait;
use crate::error::SearchError;

/// The core SearchBackend trait.
///
/// Implementations: DuckDuckGo Instant Answer, no-op (search disabled).
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// The backend name (e.g., "duckduckgo", "none").
    fn name(&self) -> &str;

    /// Look up a query and return a short plain-text summary, if one exists.
    ///
    /// `max_results` bounds how many result bodies feed the summary.
    async fn lookup(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Option<String>, SearchError>;
}
