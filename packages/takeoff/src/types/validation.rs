//! Per-material validation outcomes.

use serde::{Deserialize, Serialize};

/// How well a material is backed by the standards catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialStatus {
    /// Found in enough catalog documents
    Known,

    /// Found in the catalog, but in fewer documents than the confidence gate
    /// requires; external evidence was gathered to back it up
    KnownThinEvidence,

    /// Not in the catalog, but an allowed external source mentions it
    UnresolvedButFound,

    /// Neither the catalog nor external search confirm it
    Unresolved,
}

impl MaterialStatus {
    /// Whether the catalog itself confirms the material.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known | Self::KnownThinEvidence)
    }

    /// Whether a human should look at this material.
    pub fn needs_review(&self) -> bool {
        matches!(self, Self::UnresolvedButFound | Self::Unresolved)
    }
}

/// A recorded external search failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub attempts: u32,
    pub error: String,
}

/// Validation result for one distinct material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialValidation {
    /// Normalized material key (trimmed, upper-case)
    pub material: String,

    pub status: MaterialStatus,

    /// Catalog documents that mention the material, in retrieval order
    #[serde(default)]
    pub supporting_document_ids: Vec<String>,

    /// Matching external snippets with source attribution
    #[serde(default)]
    pub external_evidence: Option<String>,

    #[serde(default)]
    pub external_sources: Vec<String>,

    /// External search calls made (including the retry)
    #[serde(default)]
    pub search_attempts: u32,

    #[serde(default)]
    pub search_failure: Option<SearchFailure>,
}

impl MaterialValidation {
    pub fn new(material: impl Into<String>, status: MaterialStatus) -> Self {
        Self {
            material: material.into(),
            status,
            supporting_document_ids: Vec::new(),
            external_evidence: None,
            external_sources: Vec::new(),
            search_attempts: 0,
            search_failure: None,
        }
    }

    pub fn with_supporting(mut self, ids: Vec<String>) -> Self {
        self.supporting_document_ids = ids;
        self
    }

    pub fn is_known(&self) -> bool {
        self.status.is_known()
    }

    pub fn was_escalated(&self) -> bool {
        self.search_attempts > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thin_evidence_is_known() {
        assert!(MaterialStatus::Known.is_known());
        assert!(MaterialStatus::KnownThinEvidence.is_known());
        assert!(!MaterialStatus::UnresolvedButFound.is_known());
        assert!(!MaterialStatus::Unresolved.is_known());
    }

    #[test]
    fn test_only_unresolved_statuses_need_review() {
        assert!(!MaterialStatus::Known.needs_review());
        assert!(!MaterialStatus::KnownThinEvidence.needs_review());
        assert!(MaterialStatus::UnresolvedButFound.needs_review());
        assert!(MaterialStatus::Unresolved.needs_review());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&MaterialStatus::KnownThinEvidence).unwrap();
        assert_eq!(json, "\"known_thin_evidence\"");
    }
}
