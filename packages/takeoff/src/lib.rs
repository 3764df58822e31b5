//! Retrieval-Fusion and Validation Core for Utility Takeoffs
//!
//! Reads candidate utility items (pipes, structures, fittings) off drawing
//! pages, checks every material against a curated standards catalog, merges
//! duplicate detections, and assembles a reviewable report.
//!
//! # Design Philosophy
//!
//! **"Never silently drop, never silently invent"**
//!
//! - Retrieval is hybrid: BM25 and vectors fused with Reciprocal Rank Fusion
//! - A material is known only when the catalog text actually names it
//! - Unknown materials escalate to allow-listed external search, then to alerts
//! - Deduplication fails open: a bad clustering answer keeps every item
//! - The library handles mechanics; AI collaborators sit behind narrow traits
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use takeoff::{Orchestrator, RunInput, StandardsStore, MemoryVectorIndex, TakeoffConfig};
//! use takeoff::testing::{MockAI, MockExtractor};
//! use takeoff::MockWebSearcher;
//!
//! let store = Arc::new(StandardsStore::from_dir("standards/")?);
//! let orchestrator = Orchestrator::build(
//!     store,
//!     Arc::new(MockAI::new()),
//!     Arc::new(MemoryVectorIndex::new()),
//!     Arc::new(MockWebSearcher::new()),
//!     Arc::new(MockExtractor::new()),
//!     &TakeoffConfig::from_env()?,
//! )
//! .await?;
//!
//! let report = orchestrator.run(RunInput::new(pages)).await?;
//! println!("{}", report.to_json_pretty()?);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (AI, Extractor, VectorIndex, WebSearcher)
//! - [`types`] - Standards, items, validations, reports, configuration
//! - [`retrieval`] - BM25, fusion, hybrid retrieval, query expansion
//! - [`pipeline`] - Validation, deduplication, report assembly, orchestration
//! - [`stores`] - Standards catalog and in-memory vector index
//! - [`searchers`] - Tavily and rate-limited web searchers
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations and fixtures for testing

pub mod error;
pub mod pipeline;
pub mod retrieval;
pub mod searchers;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{CatalogError, Result, SearchError, TakeoffError};
pub use traits::{
    ai::{ItemCluster, AI},
    extractor::Extractor,
    searcher::{MockWebSearcher, SearchRequest, SearchResult, WebSearcher},
    vector::{cosine_similarity, VectorEntry, VectorIndex, VectorMatch},
};
pub use types::{
    config::{
        DedupConfig, ExpansionConfig, OrchestratorConfig, RetrievalConfig, TakeoffConfig,
        ValidationConfig,
    },
    item::{CandidateItem, CanonicalItem, ItemType, SourceView},
    page::{PageExtraction, PageImage},
    report::{Alert, ReportSummary, RunReport, RunWarning, Severity},
    standard::{Category, Discipline, RetrievalHit, StandardDocument, StandardFilter},
    validation::{MaterialStatus, MaterialValidation, SearchFailure},
};

// Re-export retrieval
pub use retrieval::{reciprocal_rank_fusion, Bm25Index, FusedEntry, HybridRetriever, QueryExpander};

// Re-export pipeline components
pub use pipeline::{
    // Orchestration
    FailureReason, Orchestrator, RunInput, RunPhase, RunState,
    // Stages
    Deduplicator, DedupOutcome, MaterialValidator, ValidationOutcome,
    // Report assembly
    assemble_report, build_alerts,
};

// Re-export stores
pub use stores::{CatalogStats, MemoryVectorIndex, StandardsStore};

// Re-export searchers
pub use searchers::{RateLimitedSearcher, TavilyWebSearcher, WebSearcherExt};

pub use security::{ApiKeys, SecretString};

// Re-export testing utilities
pub use testing::{MockAI, MockExtractor};
