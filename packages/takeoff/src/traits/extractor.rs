//! Extractor trait for reading candidate items off drawing pages.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::page::{PageExtraction, PageImage};

/// Image-to-structured-data collaborator.
///
/// One call per page. Implementations return what they saw; page numbers,
/// retries and timeouts are handled by the orchestrator.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract candidate items from one page.
    ///
    /// `instruction` is the full extraction prompt, including any
    /// run-specific hint text.
    async fn extract(&self, page: &PageImage, instruction: &str) -> Result<PageExtraction>;
}
