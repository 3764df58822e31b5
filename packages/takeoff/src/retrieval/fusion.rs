//! Reciprocal Rank Fusion.
//!
//! `score(d) = Σ_m 1 / (k + rank_m(d))` with 1-based ranks; a ranking that
//! does not contain `d` contributes nothing. Scores are rank-based only, so
//! lists with incomparable raw scores (BM25 vs cosine) fuse cleanly.

use std::cmp::Ordering;
use std::collections::HashMap;

/// Default smoothing constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// One fused entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry {
    pub id: String,
    pub score: f64,
    /// 1-based rank in each input ranking (same order as the input)
    pub ranks: Vec<Option<usize>>,
}

impl FusedEntry {
    /// Number of input rankings that contained this entry.
    pub fn hits(&self) -> usize {
        self.ranks.iter().filter(|r| r.is_some()).count()
    }
}

/// Fuse best-first id rankings.
///
/// Output is sorted by descending score; ties go to the better rank in the
/// first ranking (absent last), then to the smaller id. Duplicate ids within
/// one ranking keep their first position.
pub fn reciprocal_rank_fusion<S: AsRef<str>>(rankings: &[Vec<S>], k: f64) -> Vec<FusedEntry> {
    let mut entries: HashMap<&str, FusedEntry> = HashMap::new();

    for (method, ranking) in rankings.iter().enumerate() {
        for (position, id) in ranking.iter().enumerate() {
            let id = id.as_ref();
            let rank = position + 1;
            let entry = entries.entry(id).or_insert_with(|| FusedEntry {
                id: id.to_string(),
                score: 0.0,
                ranks: vec![None; rankings.len()],
            });
            if entry.ranks[method].is_none() {
                entry.ranks[method] = Some(rank);
                entry.score += 1.0 / (k + rank as f64);
            }
        }
    }

    let mut fused: Vec<FusedEntry> = entries.into_values().collect();
    fused.sort_by(compare_fused);
    fused
}

fn compare_fused(a: &FusedEntry, b: &FusedEntry) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| {
            let first = |e: &FusedEntry| e.ranks.first().copied().flatten().unwrap_or(usize::MAX);
            first(a).cmp(&first(b))
        })
        .then_with(|| a.id.cmp(&b.id))
}
