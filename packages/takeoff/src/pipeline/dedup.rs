//! Deduplication - merge detections of the same physical object.
//!
//! The AI proposes clusters; this module decides what to trust. Any
//! malformed answer falls back to keeping every detection on its own, so
//! the worst case is double counting, never a lost item.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::traits::ai::{ItemCluster, AI};
use crate::types::{
    config::DedupConfig,
    item::{CandidateItem, CanonicalItem},
};

/// AI response for clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AIClusterResponse {
    #[serde(default)]
    pub clusters: Vec<AICluster>,
}

/// A cluster from the AI response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AICluster {
    #[serde(alias = "indices", alias = "items")]
    pub members: Vec<usize>,
    #[serde(default)]
    pub keep: Option<usize>,
    #[serde(default)]
    pub rationale: Option<String>,
}

impl From<AICluster> for ItemCluster {
    fn from(c: AICluster) -> Self {
        ItemCluster {
            members: c.members,
            keep: c.keep,
            rationale: c.rationale.unwrap_or_default(),
        }
    }
}

/// Strip a surrounding markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line ("```json")
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

/// Parse cluster response from AI.
///
/// Accepts a bare array or an object with a `clusters` field, optionally
/// fenced in markdown.
pub fn parse_cluster_response(text: &str) -> Result<Vec<ItemCluster>, serde_json::Error> {
    let json = strip_code_fence(text);

    // Try parsing as array first (common format)
    if let Ok(clusters) = serde_json::from_str::<Vec<AICluster>>(json) {
        return Ok(clusters.into_iter().map(ItemCluster::from).collect());
    }

    // Try parsing as object with clusters field
    let response: AIClusterResponse = serde_json::from_str(json)?;
    Ok(response.clusters.into_iter().map(ItemCluster::from).collect())
}

/// Why a proposed clustering was rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterRejection {
    #[error("cluster references index {index} but only {len} items exist")]
    OutOfRange { index: usize, len: usize },

    #[error("index {index} appears in more than one cluster")]
    Overlap { index: usize },
}

/// Check every index is in range and belongs to at most one cluster.
pub fn validate_clusters(clusters: &[ItemCluster], len: usize) -> Result<(), ClusterRejection> {
    let mut claimed: HashSet<usize> = HashSet::new();
    for cluster in clusters {
        let members: BTreeSet<usize> = cluster.members.iter().copied().collect();
        for index in members {
            if index >= len {
                return Err(ClusterRejection::OutOfRange { index, len });
            }
            if !claimed.insert(index) {
                return Err(ClusterRejection::Overlap { index });
            }
        }
    }
    Ok(())
}

/// Pick the representative member of a cluster.
///
/// The AI's `keep` wins if it is a member; otherwise the member with the
/// most populated detail fields, lowest index on ties.
pub fn choose_representative(
    items: &[CandidateItem],
    members: &[usize],
    keep: Option<usize>,
) -> usize {
    if let Some(keep) = keep.filter(|k| members.contains(k)) {
        return keep;
    }
    members
        .iter()
        .copied()
        .fold(None::<(usize, usize)>, |best, index| {
            let score = items[index].detail_score();
            match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((index, score)),
            }
        })
        .map_or(members[0], |(index, _)| index)
}

/// Turn a validated clustering into canonical items.
///
/// Members must be in range and disjoint (see [`validate_clusters`]).
/// Returns the canonical items in output order and how many clusters
/// were split for disagreeing on discipline, material or diameter.
pub fn build_canonical(
    items: &[CandidateItem],
    clusters: &[ItemCluster],
    enforce_structural_match: bool,
) -> (Vec<CanonicalItem>, usize) {
    let mut assigned = vec![false; items.len()];
    let mut canonical = Vec::with_capacity(items.len());
    let mut splits = 0;

    for cluster in clusters {
        let members: Vec<usize> = cluster
            .members
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if members.is_empty() {
            continue;
        }

        let consistent = members
            .iter()
            .all(|&i| items[i].structurally_matches(&items[members[0]]));
        if enforce_structural_match && !consistent {
            debug!(members = ?members, "Splitting cluster with mismatched fields");
            splits += 1;
            continue;
        }

        let representative = choose_representative(items, &members, cluster.keep);
        let pages: BTreeSet<u32> = members.iter().map(|&i| items[i].source_page).collect();
        for &i in &members {
            assigned[i] = true;
        }
        canonical.push(CanonicalItem {
            item: items[representative].clone(),
            member_count: members.len(),
            member_source_pages: pages.into_iter().collect(),
            member_indices: members,
        });
    }

    for (index, item) in items.iter().enumerate() {
        if !assigned[index] {
            canonical.push(CanonicalItem::singleton(index, item.clone()));
        }
    }

    sort_canonical(&mut canonical);
    (canonical, splits)
}

/// Stable sort by discipline, then page, then first member index.
pub fn sort_canonical(items: &mut [CanonicalItem]) {
    items.sort_by_key(|c| {
        (
            c.item.discipline,
            c.item.source_page,
            c.member_indices.first().copied().unwrap_or(usize::MAX),
        )
    });
}

/// Result of one deduplication pass.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub items: Vec<CanonicalItem>,

    /// Set when clustering failed and every item was kept on its own
    pub failure: Option<String>,

    /// Proposed clusters split for mismatched fields
    pub split_clusters: usize,
}

impl DedupOutcome {
    fn singletons(items: &[CandidateItem], failure: Option<String>) -> Self {
        let mut canonical: Vec<_> = items
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, item)| CanonicalItem::singleton(i, item))
            .collect();
        sort_canonical(&mut canonical);
        Self {
            items: canonical,
            failure,
            split_clusters: 0,
        }
    }

    /// Sum of member counts; always equals the input length.
    pub fn total_members(&self) -> usize {
        self.items.iter().map(|c| c.member_count).sum()
    }
}

/// Cross-view deduplication engine.
pub struct Deduplicator<A: AI> {
    ai: Arc<A>,
    config: DedupConfig,
}

impl<A: AI> Deduplicator<A> {
    pub fn new(ai: Arc<A>) -> Self {
        Self::with_config(ai, DedupConfig::default())
    }

    pub fn with_config(ai: Arc<A>, config: DedupConfig) -> Self {
        Self { ai, config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Merge duplicate detections.
    ///
    /// Never fails: a clustering error, timeout or invalid answer keeps
    /// every item as its own canonical item and records why.
    pub async fn deduplicate(&self, items: &[CandidateItem]) -> DedupOutcome {
        if items.len() < 2 {
            return DedupOutcome::singletons(items, None);
        }

        let deadline = self.config.cluster_timeout();
        let clusters = match timeout(deadline, self.ai.cluster_items(items)).await {
            Ok(Ok(clusters)) => clusters,
            Ok(Err(e)) => {
                warn!(error = %e, items = items.len(), "Clustering failed, keeping all items");
                return DedupOutcome::singletons(items, Some(format!("clustering failed: {e}")));
            }
            Err(_) => {
                warn!(after = ?deadline, items = items.len(), "Clustering timed out, keeping all items");
                return DedupOutcome::singletons(
                    items,
                    Some(format!("clustering timed out after {deadline:?}")),
                );
            }
        };

        if let Err(rejection) = validate_clusters(&clusters, items.len()) {
            warn!(error = %rejection, "Invalid clustering, keeping all items");
            return DedupOutcome::singletons(items, Some(format!("invalid clustering: {rejection}")));
        }

        let (canonical, split_clusters) =
            build_canonical(items, &clusters, self.config.enforce_structural_match);

        info!(
            items = items.len(),
            canonical = canonical.len(),
            merged = canonical.iter().filter(|c| c.is_merged()).count(),
            split_clusters,
            "Deduplication complete"
        );

        DedupOutcome {
            items: canonical,
            failure: None,
            split_clusters,
        }
    }
}
