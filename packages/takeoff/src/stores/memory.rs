//! In-memory vector index for testing and small catalogs.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Result, TakeoffError};
use crate::traits::vector::{cosine_similarity, VectorEntry, VectorIndex, VectorMatch};
use crate::types::standard::StandardFilter;

/// In-memory storage for document embeddings.
///
/// Brute-force cosine scan. The lock is only held for the synchronous scan,
/// never across an await.
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<String, VectorEntry>>,
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored entries.
    pub fn clear(&self) -> Result<()> {
        self.entries.write().map_err(poisoned)?.clear();
        Ok(())
    }

    /// Remove one entry by id.
    pub fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.entries.write().map_err(poisoned)?.remove(id).is_some())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> TakeoffError {
    TakeoffError::Index("vector index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, entry: VectorEntry) -> Result<()> {
        if entry.embedding.is_empty() {
            return Err(TakeoffError::Index(format!(
                "entry {} has an empty embedding",
                entry.id
            )));
        }
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &StandardFilter,
    ) -> Result<Vec<VectorMatch>> {
        let entries = self.entries.read().map_err(poisoned)?;

        let mut scored: Vec<_> = entries
            .values()
            .filter(|e| filter.matches(e.discipline, e.category))
            .map(|e| VectorMatch {
                id: e.id.clone(),
                score: cosine_similarity(vector, &e.embedding),
            })
            .collect();

        // Ties fall back to id so rankings are reproducible.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::standard::{Category, Discipline};

    #[tokio::test]
    async fn test_embedding_search() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(VectorEntry::new("a", vec![1.0, 0.0, 0.0], Discipline::Storm, Category::Material))
            .await
            .unwrap();
        index
            .upsert(VectorEntry::new("b", vec![0.0, 1.0, 0.0], Discipline::Storm, Category::Material))
            .await
            .unwrap();

        let results = index
            .search(&[0.9, 0.1, 0.0], 10, &StandardFilter::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "a");
        assert!(results[0].score > 0.9);
    }

    #[tokio::test]
    async fn test_filter_and_limit() {
        let index = MemoryVectorIndex::new();
        for (id, discipline) in [
            ("storm-1", Discipline::Storm),
            ("water-1", Discipline::Water),
            ("general-1", Discipline::General),
        ] {
            index
                .upsert(VectorEntry::new(id, vec![1.0, 0.0], discipline, Category::Material))
                .await
                .unwrap();
        }

        let filter = StandardFilter::for_discipline(Discipline::Storm);
        let results = index.search(&[1.0, 0.0], 10, &filter).await.unwrap();
        let ids: Vec<_> = results.iter().map(|m| m.id.as_str()).collect();
        // Equal scores: ordered by id
        assert_eq!(ids, vec!["general-1", "storm-1"]);

        let limited = index.search(&[1.0, 0.0], 1, &StandardFilter::new()).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let index = MemoryVectorIndex::new();
        let entry = VectorEntry::new("a", vec![1.0], Discipline::Water, Category::Slope);
        index.upsert(entry.clone()).await.unwrap();
        index.upsert(entry).await.unwrap();
        assert_eq!(index.len().await.unwrap(), 1);
        assert!(index.remove("a").unwrap());
        assert!(index.is_empty().await.unwrap());
    }
}
