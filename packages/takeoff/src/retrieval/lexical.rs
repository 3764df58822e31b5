//! In-process BM25 index over the standards catalog.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use super::text::tokenize;
use crate::types::standard::{StandardDocument, StandardFilter};

/// Term-frequency saturation.
pub const BM25_K1: f64 = 1.2;

/// Length normalization.
pub const BM25_B: f64 = 0.75;

struct IndexedDocument {
    document: Arc<StandardDocument>,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

/// A lexical search hit.
#[derive(Debug, Clone)]
pub struct LexicalMatch {
    pub document: Arc<StandardDocument>,
    pub score: f64,
}

/// BM25 ranking over a fixed document set.
///
/// Built once from the catalog; searches are lock-free reads.
pub struct Bm25Index {
    documents: Vec<IndexedDocument>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl Bm25Index {
    pub fn new(documents: &[Arc<StandardDocument>]) -> Self {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut indexed = Vec::with_capacity(documents.len());
        let mut total_len = 0usize;

        for doc in documents {
            let tokens = tokenize(&doc.text);
            let mut term_freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            indexed.push(IndexedDocument {
                document: Arc::clone(doc),
                term_freqs,
                len: tokens.len(),
            });
        }

        let avg_len = if indexed.is_empty() {
            0.0
        } else {
            total_len as f64 / indexed.len() as f64
        };

        Self {
            documents: indexed,
            doc_freqs,
            avg_len,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Inverse document frequency of a term over the whole corpus.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    /// Score every document matching `filter`, best-first, up to `limit`.
    ///
    /// Only documents with a positive score are returned. Ties keep
    /// catalog order.
    pub fn search(&self, query: &str, limit: usize, filter: &StandardFilter) -> Vec<LexicalMatch> {
        let terms = tokenize(query);
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let idfs: Vec<f64> = terms.iter().map(|t| self.idf(t)).collect();

        let mut scored: Vec<(usize, f64)> = self
            .documents
            .iter()
            .enumerate()
            .filter(|(_, d)| filter.matches_document(&d.document))
            .filter_map(|(position, doc)| {
                let score = self.score_document(doc, &terms, &idfs);
                (score > 0.0).then_some((position, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(limit);

        scored
            .into_iter()
            .map(|(position, score)| LexicalMatch {
                document: Arc::clone(&self.documents[position].document),
                score,
            })
            .collect()
    }

    fn score_document(&self, doc: &IndexedDocument, terms: &[String], idfs: &[f64]) -> f64 {
        let len_norm = if self.avg_len > 0.0 {
            doc.len as f64 / self.avg_len
        } else {
            0.0
        };

        terms
            .iter()
            .zip(idfs)
            .map(|(term, idf)| {
                let tf = doc.term_freqs.get(term).copied().unwrap_or(0) as f64;
                if tf == 0.0 {
                    return 0.0;
                }
                idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len_norm))
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::standard::{Category, Discipline};

    fn docs() -> Vec<Arc<StandardDocument>> {
        vec![
            StandardDocument::new(
                "rcp",
                "Reinforced concrete pipe RCP shall conform to ASTM C76 Class III.",
                Discipline::Storm,
                Category::Material,
            ),
            StandardDocument::new(
                "pvc",
                "PVC sanitary sewer pipe shall conform to ASTM D3034 SDR 35.",
                Discipline::Sanitary,
                Category::Material,
            ),
            StandardDocument::new(
                "cover",
                "Minimum cover over water main is 42 inches.",
                Discipline::Water,
                Category::CoverDepth,
            ),
        ]
        .into_iter()
        .map(Arc::new)
        .collect()
    }

    #[test]
    fn test_exact_term_ranks_first() {
        let index = Bm25Index::new(&docs());
        let hits = index.search("RCP specifications", 10, &StandardFilter::new());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.id, "rcp");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn test_shared_term_returns_both_best_first() {
        let index = Bm25Index::new(&docs());
        let hits = index.search("pipe ASTM D3034", 10, &StandardFilter::new());
        let ids: Vec<_> = hits.iter().map(|h| h.document.id.as_str()).collect();
        assert_eq!(ids, vec!["pvc", "rcp"]);
    }

    #[test]
    fn test_filter_excludes_documents() {
        let index = Bm25Index::new(&docs());
        let filter = StandardFilter::for_discipline(Discipline::Water);
        assert!(index.search("pipe", 10, &filter).is_empty());
    }

    #[test]
    fn test_no_match_is_empty() {
        let index = Bm25Index::new(&docs());
        assert!(index.search("FPVC", 10, &StandardFilter::new()).is_empty());
        assert!(index.search("", 10, &StandardFilter::new()).is_empty());
    }

    #[test]
    fn test_idf_is_positive_for_common_terms() {
        let index = Bm25Index::new(&docs());
        assert!(index.idf("pipe") > 0.0);
        assert!(index.idf("pipe") < index.idf("rcp"));
    }
}
