//! Web searcher implementations.
//!
//! - [`TavilyWebSearcher`] - Tavily search API with domain allow-list
//! - [`RateLimitedSearcher`] - governor quota around any searcher

mod rate_limited;
mod tavily;

pub use rate_limited::{RateLimitedSearcher, RateLimitedSearcherBuilder, WebSearcherExt};
pub use tavily::TavilyWebSearcher;
