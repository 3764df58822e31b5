//! Typed errors for the takeoff core.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Only a few of these abort a run (`ExtractionUnavailable`,
//! `InvalidArgument`, `Cancelled`). Everything else is caught at the
//! component boundary and degraded into a [`RunWarning`](crate::types::report::RunWarning).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during takeoff operations.
#[derive(Debug, Error)]
pub enum TakeoffError {
    /// Malformed caller input (e.g. `k < 1`, no pages).
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// The extraction collaborator failed for every page.
    #[error("extraction unavailable: all {pages} page(s) failed (last error: {last_error})")]
    ExtractionUnavailable { pages: usize, last_error: String },

    /// The run was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// AI service unavailable or failed
    #[error("AI service error: {0}")]
    AI(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// External search failed
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// Standards catalog could not be loaded
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Vector index operation failed
    #[error("vector index error: {0}")]
    Index(String),

    /// A collaborator call exceeded its deadline
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TakeoffError {
    /// Shorthand for an [`TakeoffError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Whether this error aborts a whole run rather than a single call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. } | Self::ExtractionUnavailable { .. } | Self::Cancelled
        )
    }
}

/// Errors from the external search collaborator.
#[derive(Debug, Error)]
pub enum SearchError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Provider answered with a non-success status
    #[error("search API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    /// Request did not finish in time
    #[error("search timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors raised while loading the standards catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog file or directory could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Catalog file is not valid JSON for the expected shape
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Two documents share an id
    #[error("duplicate document id: {0}")]
    DuplicateId(String),

    /// A document has no rule text
    #[error("document {0} has empty text")]
    EmptyText(String),
}

/// Result type alias for takeoff operations.
pub type Result<T> = std::result::Result<T, TakeoffError>;

/// Result type alias for search operations.
pub type SearchOutcome<T> = std::result::Result<T, SearchError>;

/// Result type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;
