//! Vector index trait for semantic retrieval.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::standard::{Category, Discipline, StandardFilter};

/// An embedded document with the metadata retrieval filters on.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub discipline: Discipline,
    pub category: Category,
}

impl VectorEntry {
    pub fn new(
        id: impl Into<String>,
        embedding: Vec<f32>,
        discipline: Discipline,
        category: Category,
    ) -> Self {
        Self {
            id: id.into(),
            embedding,
            discipline,
            category,
        }
    }
}

/// One semantic search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity, higher is better
    pub score: f32,
}

/// Storage for document embeddings.
///
/// The in-memory implementation is enough for a catalog of a few hundred
/// rules; a hosted vector database can sit behind the same trait.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace an entry by id.
    async fn upsert(&self, entry: VectorEntry) -> Result<()>;

    /// Return up to `k` entries matching `filter`, best-first.
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &StandardFilter,
    ) -> Result<Vec<VectorMatch>>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
