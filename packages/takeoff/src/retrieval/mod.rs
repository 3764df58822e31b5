//! Hybrid retrieval over the standards catalog.
//!
//! - [`lexical`] - BM25 keyword ranking
//! - [`fusion`] - Reciprocal Rank Fusion
//! - [`hybrid`] - BM25 + vector search, fused
//! - [`expansion`] - multi-query expansion on top of hybrid retrieval

pub mod expansion;
pub mod fusion;
pub mod hybrid;
pub mod lexical;
pub mod text;

pub use expansion::QueryExpander;
pub use fusion::{reciprocal_rank_fusion, FusedEntry, DEFAULT_RRF_K};
pub use hybrid::HybridRetriever;
pub use lexical::Bm25Index;
