//! AI trait for LLM operations.
//!
//! The AI trait abstracts the reasoning and embedding capabilities the
//! takeoff core needs:
//! - Embedding generation for semantic retrieval
//! - Query paraphrasing for multi-query expansion
//! - Proposing duplicate clusters over candidate items

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::item::CandidateItem;

/// AI trait for LLM operations.
///
/// Implementations wrap specific LLM providers (OpenAI, Anthropic, etc.)
/// and handle the specifics of prompting and response parsing.
#[async_trait]
pub trait AI: Send + Sync {
    /// Generate embedding for text.
    ///
    /// Returns a vector (typically 1024 or 1536 dimensions) for
    /// semantic similarity search.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch operation).
    ///
    /// More efficient than calling `embed` multiple times.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        // Default implementation calls embed sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Paraphrase a retrieval query.
    ///
    /// Returns up to `n` alternative phrasings of the same question,
    /// e.g. "RCP specifications" might become
    /// "reinforced concrete pipe standard" or "RCP pipe class requirements".
    async fn expand_query(&self, query: &str, n: usize) -> Result<Vec<String>>;

    /// Propose clusters of candidate items that describe the same object.
    ///
    /// Indices refer to positions in `items`. Items left out of every
    /// cluster stay on their own. The caller validates the answer.
    async fn cluster_items(&self, items: &[CandidateItem]) -> Result<Vec<ItemCluster>>;
}

/// A proposed group of duplicate detections.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ItemCluster {
    /// Indices into the candidate list
    pub members: Vec<usize>,

    /// Preferred representative, if the model picked one
    #[serde(default)]
    pub keep: Option<usize>,

    /// Why these detections were grouped together
    #[serde(default)]
    pub rationale: String,
}

impl ItemCluster {
    /// Create a cluster from member indices.
    pub fn new(members: impl IntoIterator<Item = usize>) -> Self {
        Self {
            members: members.into_iter().collect(),
            keep: None,
            rationale: String::new(),
        }
    }

    /// Set the preferred representative.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = Some(keep);
        self
    }

    /// Set the rationale.
    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }
}
