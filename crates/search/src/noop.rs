//! No-op search backend — wired in when search is disabled.

use async_trait::async_trait;
use palaver_core::error::SearchError;
use palaver_core::search::SearchBackend;

/// A search backend that never finds anything.
pub struct NoSearch;

#[async_trait]
impl SearchBackend for NoSearch {
    fn name(&self) -> &str {
        "none"
    }

    async fn lookup(
        &self,
        _query: &str,
        _max_results: usize,
    ) -> std::result::Result<Option<String>, SearchError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_empty() {
        let search = NoSearch;
        let result = search.lookup("anything", 3).await.unwrap();
        assert!(result.is_none());
    }
}
