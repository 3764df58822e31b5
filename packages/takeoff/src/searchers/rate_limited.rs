//! Rate-limited searcher wrapper.
//!
//! Wraps any [`WebSearcher`] with a `governor` quota so a validation burst
//! cannot exceed the provider's request limits.

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;

use crate::error::SearchOutcome;
use crate::traits::searcher::{SearchRequest, SearchResult, WebSearcher};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Zero rates are clamped to one request per second.
fn per_second(rate: u32) -> NonZeroU32 {
    NonZeroU32::new(rate).unwrap_or(nonzero!(1u32))
}

/// A searcher that waits for a permit before every request.
pub struct RateLimitedSearcher<W: WebSearcher> {
    inner: W,
    limiter: Arc<DirectRateLimiter>,
}

impl<W: WebSearcher> RateLimitedSearcher<W> {
    pub fn new(searcher: W, requests_per_second: u32) -> Self {
        Self::with_quota(searcher, Quota::per_second(per_second(requests_per_second)))
    }

    pub fn with_quota(searcher: W, quota: Quota) -> Self {
        Self {
            inner: searcher,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Sustained rate with a larger burst allowance.
    pub fn with_burst(searcher: W, requests_per_second: u32, burst: u32) -> Self {
        let quota = Quota::per_second(per_second(requests_per_second)).allow_burst(per_second(burst));
        Self::with_quota(searcher, quota)
    }

    pub fn inner(&self) -> &W {
        &self.inner
    }
}

#[async_trait]
impl<W: WebSearcher> WebSearcher for RateLimitedSearcher<W> {
    async fn search(&self, request: &SearchRequest) -> SearchOutcome<Vec<SearchResult>> {
        self.limiter.until_ready().await;
        self.inner.search(request).await
    }
}

/// Builder for [`RateLimitedSearcher`].
pub struct RateLimitedSearcherBuilder<W: WebSearcher> {
    searcher: W,
    requests_per_second: u32,
    burst: Option<u32>,
}

impl<W: WebSearcher> RateLimitedSearcherBuilder<W> {
    pub fn new(searcher: W) -> Self {
        Self {
            searcher,
            requests_per_second: 1,
            burst: None,
        }
    }

    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.requests_per_second = rps;
        self
    }

    pub fn burst(mut self, burst: u32) -> Self {
        self.burst = Some(burst);
        self
    }

    pub fn build(self) -> RateLimitedSearcher<W> {
        match self.burst {
            Some(burst) => {
                RateLimitedSearcher::with_burst(self.searcher, self.requests_per_second, burst)
            }
            None => RateLimitedSearcher::new(self.searcher, self.requests_per_second),
        }
    }
}

/// Extension trait for wrapping searchers.
pub trait WebSearcherExt: WebSearcher + Sized {
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedSearcher<Self> {
        RateLimitedSearcher::new(self, requests_per_second)
    }

    fn rate_limited_with_burst(self, requests_per_second: u32, burst: u32) -> RateLimitedSearcher<Self> {
        RateLimitedSearcher::with_burst(self, requests_per_second, burst)
    }
}

impl<W: WebSearcher + Sized> WebSearcherExt for W {}
