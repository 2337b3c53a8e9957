//! Ephemeral context enrichment — temporal grounding and fact retrieval.
//!
//! The pipeline produces the short-lived system entries that sit between
//! persisted history and the current user message in the outbound payload.
//! Nothing produced here is ever persisted, and nothing here can fail a
//! turn: search trouble of any kind degrades to "no facts available".

use palaver_core::search::SearchBackend;
use palaver_core::session::{Message, VerificationState};
use chrono::format::{Item, StrftimeItems};
use chrono::{FixedOffset, Offset, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Builds the ephemeral context entries for one turn.
pub struct EnrichmentPipeline {
    /// Fact retrieval backend; a no-op backend disables retrieval cleanly
    search: Arc<dyn SearchBackend>,

    /// strftime layout for the temporal entry
    time_format: String,

    /// Display offset applied to the UTC clock
    offset: FixedOffset,

    /// Lowercased keywords; any containment hit triggers retrieval
    trigger_keywords: Vec<String>,

    /// Result bound handed to the search backend
    search_max_results: usize,

    /// Hard deadline for one retrieval, kept well below the generation
    /// timeout so a slow lookup can delay a turn but never dominate it
    search_timeout: Duration,
}

impl EnrichmentPipeline {
    /// Create a pipeline with default knobs around the given backend.
    pub fn new(search: Arc<dyn SearchBackend>) -> Self {
        Self {
            search,
            time_format: DEFAULT_TIME_FORMAT.into(),
            offset: Utc.fix(),
            trigger_keywords: Vec::new(),
            search_max_results: 3,
            search_timeout: Duration::from_secs(5),
        }
    }

    /// Set the strftime layout for the temporal entry.
    ///
    /// A layout with invalid specifiers is rejected with a warning and the
    /// previous layout kept, so rendering the entry can never fail later.
    pub fn with_time_format(mut self, format: impl Into<String>) -> Self {
        let format = format.into();
        let invalid = StrftimeItems::new(&format).any(|item| matches!(item, Item::Error));
        if invalid {
            warn!(format = %format, "Invalid time format, keeping previous layout");
        } else {
            self.time_format = format;
        }
        self
    }

    /// Shift the displayed clock by whole minutes from UTC.
    pub fn with_utc_offset_minutes(mut self, minutes: i32) -> Self {
        if let Some(offset) = FixedOffset::east_opt(minutes.saturating_mul(60)) {
            self.offset = offset;
        } else {
            warn!(minutes, "UTC offset out of range, keeping previous offset");
        }
        self
    }

    /// Set the keywords whose presence in a message triggers retrieval.
    pub fn with_trigger_keywords(mut self, keywords: Vec<String>) -> Self {
        self.trigger_keywords = keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        self
    }

    /// Bound retrieval by result count and wall-clock deadline.
    pub fn with_search_limits(mut self, max_results: usize, timeout: Duration) -> Self {
        self.search_max_results = max_results;
        self.search_timeout = timeout;
        self
    }

    /// Produce the ephemeral entries for one turn.
    ///
    /// Always yields the temporal-grounding entry. Yields a fact entry only
    /// when the message trips a trigger keyword and the backend returns a
    /// summary within the deadline; failure, timeout, and empty results all
    /// degrade to the temporal entry alone.
    pub async fn build(&self, text: &str, state: VerificationState) -> Vec<Message> {
        let mut entries = Vec::with_capacity(2);
        entries.push(Message::ephemeral_system(self.temporal_entry(state)));

        if self.is_triggered(text) {
            if let Some(summary) = self.retrieve(text).await {
                entries.push(Message::ephemeral_system(format!(
                    "Retrieved context:\n{summary}"
                )));
            }
        }

        entries
    }

    fn temporal_entry(&self, state: VerificationState) -> String {
        let stamp = Utc::now()
            .with_timezone(&self.offset)
            .format(&self.time_format);
        format!("Current time: {stamp} | verification: {state}")
    }

    fn is_triggered(&self, text: &str) -> bool {
        if self.trigger_keywords.is_empty() {
            return false;
        }
        let lowered = text.to_lowercase();
        self.trigger_keywords.iter().any(|k| lowered.contains(k.as_str()))
    }

    async fn retrieve(&self, query: &str) -> Option<String> {
        let lookup = self.search.lookup(query, self.search_max_results);
        match tokio::time::timeout(self.search_timeout, lookup).await {
            Ok(Ok(Some(summary))) => {
                debug!(backend = self.search.name(), "Retrieved search context");
                Some(summary)
            }
            Ok(Ok(None)) => {
                debug!(backend = self.search.name(), "Search found nothing");
                None
            }
            Ok(Err(e)) => {
                debug!(backend = self.search.name(), error = %e, "Search failed, continuing without it");
                None
            }
            Err(_) => {
                debug!(
                    backend = self.search.name(),
                    timeout_ms = self.search_timeout.as_millis() as u64,
                    "Search timed out, continuing without it"
                );
                None
            }
        }
    }
}
