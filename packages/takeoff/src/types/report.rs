//! Run report - the final, JSON-serializable output of one takeoff run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::CanonicalItem;
use super::standard::Discipline;
use super::validation::MaterialValidation;

/// Alert severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Something a reviewer must look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,

    /// Material key, or `None` for run-level alerts
    pub material: Option<String>,

    pub message: String,
}

impl Alert {
    pub fn new(severity: Severity, material: Option<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            material,
            message: message.into(),
        }
    }
}

/// A non-fatal condition that degraded part of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunWarning {
    /// Some pages could not be extracted; the run continued without them
    PartialExtractionFailure { pages: Vec<u32>, errors: Vec<String> },

    /// Extracted items without a material were left out of the run
    BlankMaterialDropped { pages: Vec<u32>, count: usize },

    /// Retrieval returned nothing for a material's query
    RetrievalEmpty { material: String },

    /// External search failed after its retry
    ExternalSearchFailure { material: String, error: String },

    /// Clustering failed or was invalid; every item was kept as its own cluster
    DeduplicationReasoningFailure { reason: String },
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartialExtractionFailure { pages, .. } => {
                write!(f, "extraction failed for page(s) {pages:?}")
            }
            Self::BlankMaterialDropped { pages, count } => {
                write!(f, "{count} item(s) without a material dropped from page(s) {pages:?}")
            }
            Self::RetrievalEmpty { material } => {
                write!(f, "no catalog documents retrieved for {material}")
            }
            Self::ExternalSearchFailure { material, error } => {
                write!(f, "external search failed for {material}: {error}")
            }
            Self::DeduplicationReasoningFailure { reason } => {
                write!(f, "deduplication skipped: {reason}")
            }
        }
    }
}

/// Headline counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Canonical item count (each cluster counts once)
    pub total: usize,

    pub by_discipline: BTreeMap<Discipline, usize>,

    /// Sum of representative lengths (feet) per discipline
    pub length_by_discipline: BTreeMap<Discipline, f64>,
}

impl ReportSummary {
    pub fn from_items(items: &[CanonicalItem]) -> Self {
        let mut summary = Self {
            total: items.len(),
            ..Default::default()
        };
        for canonical in items {
            let discipline = canonical.item.discipline;
            *summary.by_discipline.entry(discipline).or_insert(0) += 1;
            if let Some(length) = canonical.item.length_ft {
                *summary.length_by_discipline.entry(discipline).or_insert(0.0) += length;
            }
        }
        summary
    }
}

/// The full output of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub summary: ReportSummary,
    pub items: Vec<CanonicalItem>,
    /// Sorted by material key
    pub materials: Vec<MaterialValidation>,
    pub alerts: Vec<Alert>,
    pub warnings: Vec<RunWarning>,
}

impl RunReport {
    /// Look up the validation for a material key.
    pub fn material(&self, key: &str) -> Option<&MaterialValidation> {
        self.materials
            .binary_search_by(|m| m.material.as_str().cmp(key))
            .ok()
            .map(|i| &self.materials[i])
    }

    pub fn alerts_for<'a>(&'a self, material: &'a str) -> impl Iterator<Item = &'a Alert> + 'a {
        self.alerts
            .iter()
            .filter(move |a| a.material.as_deref() == Some(material))
    }

    /// Highest alert severity in the report, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.alerts.iter().map(|a| a.severity).max()
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
