//! Tavily-powered web searcher.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{SearchError, SearchOutcome};
use crate::security::SecretString;
use crate::traits::searcher::{SearchRequest, SearchResult, WebSearcher};

const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    include_domains: &'a [String],
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

impl TavilyResult {
    fn into_search_result(self) -> Option<SearchResult> {
        let url = Url::parse(&self.url).ok()?;
        Some(SearchResult {
            url,
            title: self.title,
            snippet: self.content,
            score: self.score.map(|s| s as f32),
        })
    }
}

/// Web searcher backed by the Tavily search API.
pub struct TavilyWebSearcher {
    client: Client,
    api_key: SecretString,
    search_depth: String,
    endpoint: String,
}

impl TavilyWebSearcher {
    pub fn new(api_key: impl Into<SecretString>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            search_depth: "basic".to_string(),
            endpoint: TAVILY_SEARCH_URL.to_string(),
        }
    }

    /// Set search depth ("basic" or "advanced").
    pub fn with_search_depth(mut self, depth: impl Into<String>) -> Self {
        self.search_depth = depth.into();
        self
    }

    /// Point at a different endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl WebSearcher for TavilyWebSearcher {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome<Vec<SearchResult>> {
        let body = TavilyRequest {
            query: &request.query,
            search_depth: &self.search_depth,
            include_domains: &request.include_domains,
            max_results: request.max_results,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", self.api_key.bearer())
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::Http(Box::new(e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimitExceeded);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Http(Box::new(e)))?;

        // Tavily treats include_domains as a hint; enforce it here too
        let results: Vec<SearchResult> = parsed
            .results
            .into_iter()
            .filter_map(TavilyResult::into_search_result)
            .filter(|r| request.allows(&r.url))
            .take(request.max_results)
            .collect();

        debug!(query = %request.query, results = results.len(), "Tavily search complete");
        Ok(results)
    }
}
