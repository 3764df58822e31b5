//! Hybrid retrieval: BM25 and vector search fused with RRF.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::fusion::reciprocal_rank_fusion;
use super::lexical::Bm25Index;
use crate::error::{Result, TakeoffError};
use crate::stores::StandardsStore;
use crate::traits::{
    ai::AI,
    vector::{VectorEntry, VectorIndex},
};
use crate::types::{
    config::RetrievalConfig,
    standard::{RetrievalHit, StandardFilter},
};

/// Retrieval engine over one standards catalog.
///
/// # Example
///
/// ```rust,ignore
/// let retriever = HybridRetriever::new(store, ai, Arc::new(MemoryVectorIndex::new()));
/// retriever.index_catalog().await?;
///
/// let filter = StandardFilter::for_discipline(Discipline::Storm);
/// let hits = retriever.retrieve("RCP cover depth", 5, Some(&filter)).await?;
/// ```
pub struct HybridRetriever<A: AI, V: VectorIndex> {
    store: Arc<StandardsStore>,
    lexical: Bm25Index,
    ai: Arc<A>,
    vectors: Arc<V>,
    config: RetrievalConfig,
}

impl<A: AI, V: VectorIndex> HybridRetriever<A, V> {
    /// Create a retriever; the BM25 index is built immediately.
    pub fn new(store: Arc<StandardsStore>, ai: Arc<A>, vectors: Arc<V>) -> Self {
        Self::with_config(store, ai, vectors, RetrievalConfig::default())
    }

    /// Create with custom configuration.
    pub fn with_config(
        store: Arc<StandardsStore>,
        ai: Arc<A>,
        vectors: Arc<V>,
        config: RetrievalConfig,
    ) -> Self {
        let lexical = Bm25Index::new(store.documents());
        Self {
            store,
            lexical,
            ai,
            vectors,
            config,
        }
    }

    pub fn store(&self) -> &Arc<StandardsStore> {
        &self.store
    }

    pub fn ai(&self) -> &Arc<A> {
        &self.ai
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Embed every catalog document and upsert it into the vector index.
    ///
    /// Returns the number of documents indexed.
    pub async fn index_catalog(&self) -> Result<usize> {
        let documents = self.store.documents();
        if documents.is_empty() {
            return Ok(0);
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.text.as_str()).collect();
        let embeddings = self.ai.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(TakeoffError::Index(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        for (doc, embedding) in documents.iter().zip(embeddings) {
            self.vectors
                .upsert(VectorEntry::new(
                    doc.id.clone(),
                    embedding,
                    doc.discipline,
                    doc.category,
                ))
                .await?;
        }

        info!(documents = documents.len(), "Catalog indexed");
        Ok(documents.len())
    }

    /// Retrieve up to `k` documents for a query.
    ///
    /// Each method contributes `k * candidate_multiplier` candidates. A
    /// failed or slow embedding call degrades to lexical-only.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&StandardFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        if k < 1 {
            return Err(TakeoffError::invalid_argument("k must be at least 1"));
        }

        let filter = filter.copied().unwrap_or_default();
        let candidates = k.saturating_mul(self.config.candidate_multiplier.max(1));

        let lexical: Vec<String> = self
            .lexical
            .search(query, candidates, &filter)
            .into_iter()
            .map(|m| m.document.id.clone())
            .collect();
        let semantic = self.semantic_ids(query, candidates, &filter).await;

        debug!(
            query,
            lexical = lexical.len(),
            semantic = semantic.len(),
            "Hybrid retrieval candidates"
        );

        let fused = reciprocal_rank_fusion(&[lexical, semantic], self.config.rrf_k);

        let hits = fused
            .into_iter()
            .filter_map(|entry| {
                let Some(document) = self.store.get(&entry.id) else {
                    debug!(id = %entry.id, "Vector index returned an id not in the catalog");
                    return None;
                };
                Some(RetrievalHit {
                    document: Arc::clone(document),
                    lexical_rank: entry.ranks[0],
                    semantic_rank: entry.ranks[1],
                    fused_score: entry.score,
                    variant_hits: 1,
                })
            })
            .take(k)
            .collect();

        Ok(hits)
    }

    /// Semantic ranking, or nothing if the embedding or index call fails.
    async fn semantic_ids(&self, query: &str, limit: usize, filter: &StandardFilter) -> Vec<String> {
        let deadline = self.config.embed_timeout();
        let embedding = match timeout(deadline, self.ai.embed(query)).await {
            Ok(Ok(embedding)) => embedding,
            Ok(Err(e)) => {
                warn!(query, error = %e, "Query embedding failed, using lexical only");
                return Vec::new();
            }
            Err(_) => {
                warn!(query, after = ?deadline, "Query embedding timed out, using lexical only");
                return Vec::new();
            }
        };

        match self.vectors.search(&embedding, limit, filter).await {
            Ok(matches) => matches.into_iter().map(|m| m.id).collect(),
            Err(e) => {
                warn!(query, error = %e, "Vector search failed, using lexical only");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryVectorIndex;
    use crate::testing::{sample_catalog, MockAI};
    use crate::types::standard::Discipline;
    use std::time::Duration;

    async fn retriever(ai: MockAI) -> HybridRetriever<MockAI, MemoryVectorIndex> {
        let retriever = HybridRetriever::new(
            Arc::new(sample_catalog()),
            Arc::new(ai),
            Arc::new(MemoryVectorIndex::new()),
        );
        retriever.index_catalog().await.unwrap();
        retriever
    }

    #[tokio::test]
    async fn test_zero_k_is_invalid() {
        let retriever = retriever(MockAI::new()).await;
        let err = retriever.retrieve("RCP", 0, None).await.unwrap_err();
        assert!(matches!(err, TakeoffError::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let retriever = retriever(MockAI::new()).await;
        let first = retriever.retrieve("RCP pipe specifications", 5, None).await.unwrap();
        let second = retriever.retrieve("RCP pipe specifications", 5, None).await.unwrap();

        assert!(!first.is_empty());
        let ids = |hits: &[RetrievalHit]| hits.iter().map(|h| h.document.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        let rcp = first.iter().find(|h| h.document.id == "storm-rcp").unwrap();
        assert_eq!(rcp.lexical_rank, Some(1));
    }

    #[tokio::test]
    async fn test_respects_k_and_sorts_by_score() {
        let retriever = retriever(MockAI::new()).await;
        let hits = retriever.retrieve("pipe", 2, None).await.unwrap();
        assert!(hits.len() <= 2);
        assert!(hits.windows(2).all(|w| w[0].fused_score >= w[1].fused_score));
    }

    #[tokio::test]
    async fn test_discipline_filter_admits_general() {
        let retriever = retriever(MockAI::new()).await;
        let filter = StandardFilter::for_discipline(Discipline::Water);
        let hits = retriever.retrieve("pipe", 10, Some(&filter)).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| matches!(h.document.discipline, Discipline::Water | Discipline::General)));
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_lexical() {
        let retriever = retriever(MockAI::new()).await;
        retriever.ai().fail_embeddings(true);

        let hits = retriever.retrieve("RCP", 5, None).await.unwrap();
        assert!(!hits.is_empty());
        assert!(hits.iter().all(|h| h.semantic_rank.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_embedding_times_out() {
        let ai = MockAI::new();
        let retriever = HybridRetriever::with_config(
            Arc::new(sample_catalog()),
            Arc::new(ai),
            Arc::new(MemoryVectorIndex::new()),
            RetrievalConfig::default().with_embed_timeout(Duration::from_secs(1)),
        );
        retriever.index_catalog().await.unwrap();
        retriever.ai().set_embed_delay(Some(Duration::from_secs(5)));

        let hits = retriever.retrieve("RCP", 5, None).await.unwrap();
        assert!(hits.iter().all(|h| h.semantic_rank.is_none()));
    }
}
