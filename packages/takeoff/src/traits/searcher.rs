//! Web searcher trait for escalating unconfirmed materials.
//!
//! When the standards catalog cannot confirm a material, the validator asks
//! an external search provider (Tavily, SerpAPI, etc.) restricted to a list
//! of trusted standards bodies.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::error::{SearchError, SearchOutcome};

/// A single search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,

    /// Restrict results to these domains (empty = unrestricted).
    pub include_domains: Vec<String>,

    pub max_results: usize,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            include_domains: Vec::new(),
            max_results: 5,
        }
    }

    pub fn with_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include_domains = domains.into_iter().map(|d| d.into()).collect();
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Whether a URL's host falls inside the allow-list.
    pub fn allows(&self, url: &Url) -> bool {
        if self.include_domains.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        self.include_domains
            .iter()
            .any(|d| host == d || host.ends_with(&format!(".{d}")))
    }
}

/// A search hit with metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub url: Url,

    /// Title of the page (if available from search results).
    pub title: Option<String>,

    /// Snippet/description from search results.
    pub snippet: Option<String>,

    /// Relevance score (0.0-1.0, if provided by search API).
    pub score: Option<f32>,
}

impl SearchResult {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            title: None,
            snippet: None,
            score: None,
        }
    }

    /// Create from a URL string.
    pub fn from_url(url: &str) -> Option<Self> {
        Url::parse(url).ok().map(Self::new)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Web search trait for external evidence.
///
/// # Implementations
///
/// - `TavilyWebSearcher` - Tavily API
/// - `RateLimitedSearcher` - wraps any searcher with a request quota
/// - `MockWebSearcher` - For testing
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Run one search. Results are ranked best-first.
    async fn search(&self, request: &SearchRequest) -> SearchOutcome<Vec<SearchResult>>;
}

#[async_trait]
impl<W: WebSearcher + ?Sized> WebSearcher for std::sync::Arc<W> {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome<Vec<SearchResult>> {
        (**self).search(request).await
    }
}

/// Mock web searcher for testing.
///
/// Results are looked up by exact query; unknown queries return the
/// fallback results (empty by default).
#[derive(Default)]
pub struct MockWebSearcher {
    results: Mutex<HashMap<String, Vec<SearchResult>>>,
    fallback: Mutex<Vec<SearchResult>>,
    failures_remaining: Mutex<u32>,
    delay: Option<Duration>,
    calls: Mutex<Vec<SearchRequest>>,
}

impl MockWebSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add results for a query.
    pub fn with_results(self, query: &str, results: Vec<SearchResult>) -> Self {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(query.to_string(), results);
        self
    }

    /// Add URL strings as results.
    pub fn with_urls(self, query: &str, urls: &[&str]) -> Self {
        let results: Vec<_> = urls
            .iter()
            .filter_map(|u| SearchResult::from_url(u))
            .collect();
        self.with_results(query, results)
    }

    /// Results for any query without a scripted answer.
    pub fn with_fallback(self, results: Vec<SearchResult>) -> Self {
        *self.fallback.lock().unwrap_or_else(PoisonError::into_inner) = results;
        self
    }

    /// Fail the next `n` calls with an API error.
    pub fn failing(self, n: u32) -> Self {
        *self
            .failures_remaining
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = n;
        self
    }

    /// Sleep before answering (for timeout tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every request received so far, in order.
    pub fn calls(&self) -> Vec<SearchRequest> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl WebSearcher for MockWebSearcher {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome<Vec<SearchResult>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut remaining = self
                .failures_remaining
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SearchError::Api {
                    status: 503,
                    message: "scripted failure".to_string(),
                });
            }
        }

        let scripted = self
            .results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.query)
            .cloned();
        let mut results = match scripted {
            Some(results) => results,
            None => self
                .fallback
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        results.retain(|r| request.allows(&r.url));
        results.truncate(request.max_results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_web_searcher() {
        let searcher = MockWebSearcher::new().with_urls(
            "RCP material specifications standard",
            &["https://www.astm.org/c0076", "https://awwa.org/c900"],
        );

        let request = SearchRequest::new("RCP material specifications standard");
        let results = searcher.search(&request).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url.as_str(), "https://www.astm.org/c0076");
        assert_eq!(searcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_max_results_and_domains() {
        let searcher = MockWebSearcher::new().with_fallback(
            ["https://astm.org/a", "https://blog.example.com/b", "https://astm.org/c"]
                .iter()
                .filter_map(|u| SearchResult::from_url(u))
                .collect(),
        );

        let request = SearchRequest::new("anything")
            .with_domains(["astm.org"])
            .with_max_results(1);
        let results = searcher.search(&request).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url.as_str(), "https://astm.org/a");
    }

    #[tokio::test]
    async fn test_scripted_failures_then_success() {
        let searcher = MockWebSearcher::new().failing(1);
        let request = SearchRequest::new("q");
        assert!(searcher.search(&request).await.is_err());
        assert!(searcher.search(&request).await.is_ok());
    }

    #[test]
    fn test_allows_subdomains_only() {
        let request = SearchRequest::new("q").with_domains(["astm.org"]);
        assert!(request.allows(&Url::parse("https://www.astm.org/x").unwrap()));
        assert!(request.allows(&Url::parse("https://astm.org/x").unwrap()));
        assert!(!request.allows(&Url::parse("https://notastm.org/x").unwrap()));
    }
}
