//! Multi-query expansion.
//!
//! One query becomes the original plus up to N variants: abbreviation
//! substitutions from the catalog's table first, then AI paraphrases.
//! Every variant is retrieved independently and the rankings are fused
//! with RRF, so a document surfaced by several phrasings rises.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::fusion::reciprocal_rank_fusion;
use super::hybrid::HybridRetriever;
use super::text::replace_token;
use crate::error::{Result, TakeoffError};
use crate::traits::{ai::AI, vector::VectorIndex};
use crate::types::{
    config::ExpansionConfig,
    standard::{RetrievalHit, StandardFilter},
};

/// Rewrites queries and fuses retrieval across the rewrites.
pub struct QueryExpander<A: AI, V: VectorIndex> {
    retriever: Arc<HybridRetriever<A, V>>,
    config: ExpansionConfig,
}

impl<A: AI, V: VectorIndex> QueryExpander<A, V> {
    pub fn new(retriever: Arc<HybridRetriever<A, V>>) -> Self {
        Self::with_config(retriever, ExpansionConfig::default())
    }

    pub fn with_config(retriever: Arc<HybridRetriever<A, V>>, config: ExpansionConfig) -> Self {
        Self { retriever, config }
    }

    pub fn retriever(&self) -> &Arc<HybridRetriever<A, V>> {
        &self.retriever
    }

    pub fn config(&self) -> &ExpansionConfig {
        &self.config
    }

    /// Abbreviation substitutions of `query`, in table order.
    pub fn abbreviation_variants(&self, query: &str) -> Vec<String> {
        self.retriever
            .store()
            .abbreviations()
            .iter()
            .filter_map(|(abbr, phrase)| replace_token(query, abbr, phrase))
            .collect()
    }

    /// The original query followed by up to `max_variants` distinct rewrites.
    ///
    /// Paraphrase failures are logged and contribute nothing.
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let max = self.config.max_variants;
        let mut candidates = self.abbreviation_variants(query);

        if self.config.paraphrase && max > 0 {
            let deadline = self.config.paraphrase_timeout();
            match timeout(deadline, self.retriever.ai().expand_query(query, max)).await {
                Ok(Ok(paraphrases)) => candidates.extend(paraphrases),
                Ok(Err(e)) => warn!(query, error = %e, "Paraphrase failed, using substitutions only"),
                Err(_) => warn!(query, after = ?deadline, "Paraphrase timed out, using substitutions only"),
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(query.trim().to_lowercase());

        let mut variants = vec![query.to_string()];
        for candidate in candidates {
            if variants.len() > max {
                break;
            }
            let candidate = candidate.trim();
            if candidate.is_empty() || !seen.insert(candidate.to_lowercase()) {
                continue;
            }
            variants.push(candidate.to_string());
        }

        debug!(query, variants = variants.len() - 1, "Query expanded");
        variants
    }

    /// Retrieve with expansion; falls back to plain retrieval when disabled.
    ///
    /// Hits report the best lexical/semantic rank seen under any variant and
    /// how many variants surfaced them.
    pub async fn retrieve_expanded(
        &self,
        query: &str,
        k: usize,
        filter: Option<&StandardFilter>,
    ) -> Result<Vec<RetrievalHit>> {
        if k < 1 {
            return Err(TakeoffError::invalid_argument("k must be at least 1"));
        }
        if !self.config.enabled {
            return self.retriever.retrieve(query, k, filter).await;
        }

        let variants = self.expand(query).await;
        let per_variant = k.saturating_mul(self.retriever.config().candidate_multiplier.max(1));

        let results = join_all(
            variants
                .iter()
                .map(|v| self.retriever.retrieve(v, per_variant, filter)),
        )
        .await;

        let mut rankings: Vec<Vec<String>> = Vec::with_capacity(results.len());
        let mut best: HashMap<String, RetrievalHit> = HashMap::new();

        for result in results {
            let hits = result?;
            rankings.push(hits.iter().map(|h| h.document.id.clone()).collect());
            for hit in hits {
                best.entry(hit.document.id.clone())
                    .and_modify(|b| {
                        b.lexical_rank = min_rank(b.lexical_rank, hit.lexical_rank);
                        b.semantic_rank = min_rank(b.semantic_rank, hit.semantic_rank);
                    })
                    .or_insert(hit);
            }
        }

        let fused = reciprocal_rank_fusion(&rankings, self.retriever.config().rrf_k);

        let hits = fused
            .into_iter()
            .take(k)
            .filter_map(|entry| {
                let mut hit = best.remove(&entry.id)?;
                hit.fused_score = entry.score;
                hit.variant_hits = entry.hits();
                Some(hit)
            })
            .collect();

        Ok(hits)
    }
}

fn min_rank(a: Option<usize>, b: Option<usize>) -> Option<usize> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
