//! DuckDuckGo Instant Answer backend.
//!
//! Queries the JSON Instant Answer API and condenses the response into one
//! plain-text summary: the abstract when present, otherwise the first few
//! related-topic snippets joined by newlines.

use async_trait::async_trait;
use palaver_core::error::SearchError;
use palaver_core::search::SearchBackend;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// A search backend over the DuckDuckGo Instant Answer API.
pub struct DuckDuckGoSearch {
    base_url: String,
    client: reqwest::Client,
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.duckduckgo.com".into(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Point the client at a different endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn summarize(answer: ApiAnswer, max_results: usize) -> Option<String> {
        let abstract_text = answer.abstract_text.trim();
        if !abstract_text.is_empty() {
            return Some(abstract_text.to_string());
        }

        let mut bodies = Vec::new();
        collect_texts(&answer.related_topics, max_results, &mut bodies);
        if bodies.is_empty() {
            None
        } else {
            Some(bodies.join("\n"))
        }
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

/// Walk related topics depth-first, collecting up to `limit` snippet bodies.
/// Topic groups nest one level in practice, but the walk handles any depth.
fn collect_texts(topics: &[RelatedTopic], limit: usize, out: &mut Vec<String>) {
    for topic in topics {
        if out.len() >= limit {
            return;
        }
        if let Some(text) = &topic.text {
            let text = text.trim();
            if !text.is_empty() {
                out.push(text.to_string());
            }
        }
        collect_texts(&topic.topics, limit, out);
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoSearch {
    fn name(&self) -> &str {
        "duckduckgo"
    }

    async fn lookup(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Option<String>, SearchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| SearchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Request(format!(
                "search endpoint returned status {}",
                status.as_u16()
            )));
        }

        let answer: ApiAnswer = response
            .json()
            .await
            .map_err(|e| SearchError::MalformedResponse(e.to_string()))?;

        let summary = Self::summarize(answer, max_results);
        debug!(query_len = query.len(), found = summary.is_some(), "Search lookup finished");
        Ok(summary)
    }
}

// --- Wire types (internal) ---

#[derive(Debug, Default, Deserialize)]
struct ApiAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,

    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<RelatedTopic>,
}

/// One related topic. Plain entries carry `Text`; disambiguation groups
/// carry a nested `Topics` list instead.
#[derive(Debug, Deserialize)]
struct RelatedTopic {
    #[serde(rename = "Text", default)]
    text: Option<String>,

    #[serde(rename = "Topics", default)]
    topics: Vec<RelatedTopic>,
}
