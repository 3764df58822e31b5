//! Configuration types for retrieval, validation, deduplication and runs.

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::standard::Discipline;
use crate::error::{Result, TakeoffError};

/// Domains external search is restricted to by default.
pub const DEFAULT_ALLOWED_DOMAINS: [&str; 4] =
    ["iccsafe.org", "astm.org", "awwa.org", "asce.org"];

/// Configuration for hybrid retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// RRF smoothing constant.
    ///
    /// Larger values flatten the difference between top ranks. Default: 60.
    pub rrf_k: f64,

    /// Each method returns `k * candidate_multiplier` candidates before fusion.
    ///
    /// Default: 2.
    pub candidate_multiplier: usize,

    /// Deadline for embedding the query. Default: 10s.
    pub embed_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            candidate_multiplier: 2,
            embed_timeout_secs: 10,
        }
    }
}

impl RetrievalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rrf_k(mut self, k: f64) -> Self {
        self.rrf_k = k;
        self
    }

    pub fn with_candidate_multiplier(mut self, multiplier: usize) -> Self {
        self.candidate_multiplier = multiplier;
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout_secs = timeout.as_secs();
        self
    }

    pub fn embed_timeout(&self) -> Duration {
        Duration::from_secs(self.embed_timeout_secs)
    }
}

/// Configuration for multi-query expansion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Expand queries at all. Default: true.
    pub enabled: bool,

    /// Ask the AI for paraphrases in addition to abbreviation substitution.
    ///
    /// Default: true.
    pub paraphrase: bool,

    /// Maximum variants besides the original query. Default: 3.
    pub max_variants: usize,

    /// Deadline for the paraphrase call. Default: 10s.
    pub paraphrase_timeout_secs: u64,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            paraphrase: true,
            max_variants: 3,
            paraphrase_timeout_secs: 10,
        }
    }
}

impl ExpansionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable expansion entirely (plain retrieval).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_paraphrase(mut self, paraphrase: bool) -> Self {
        self.paraphrase = paraphrase;
        self
    }

    pub fn with_max_variants(mut self, max: usize) -> Self {
        self.max_variants = max;
        self
    }

    pub fn paraphrase_timeout(&self) -> Duration {
        Duration::from_secs(self.paraphrase_timeout_secs)
    }
}

/// Configuration for material validation and escalation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Documents retrieved per material. Default: 5.
    pub retrieval_k: usize,

    /// Escalate known materials with fewer supporting documents than
    /// `min_supporting_documents`.
    ///
    /// Default: true.
    pub confidence_gate: bool,

    /// Default: 3.
    pub min_supporting_documents: usize,

    /// Minimum provider score for an external result to count. Default: 0.5.
    pub min_external_score: f32,

    /// External search is restricted to these domains.
    pub allowed_domains: Vec<String>,

    /// Default: 5.
    pub max_external_results: usize,

    /// Deadline per external search attempt. Default: 20s.
    pub search_timeout_secs: u64,

    /// Retries after a failed external search. Default: 1.
    pub search_retries: u32,

    /// Materials validated concurrently. Default: 5.
    pub concurrency: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            retrieval_k: 5,
            confidence_gate: true,
            min_supporting_documents: 3,
            min_external_score: 0.5,
            allowed_domains: DEFAULT_ALLOWED_DOMAINS.iter().map(|d| d.to_string()).collect(),
            max_external_results: 5,
            search_timeout_secs: 20,
            search_retries: 1,
            concurrency: 5,
        }
    }
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retrieval_k(mut self, k: usize) -> Self {
        self.retrieval_k = k;
        self
    }

    pub fn with_confidence_gate(mut self, enabled: bool) -> Self {
        self.confidence_gate = enabled;
        self
    }

    pub fn with_min_supporting_documents(mut self, min: usize) -> Self {
        self.min_supporting_documents = min;
        self
    }

    pub fn with_min_external_score(mut self, score: f32) -> Self {
        self.min_external_score = score;
        self
    }

    pub fn with_allowed_domains(
        mut self,
        domains: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_domains = domains.into_iter().map(|d| d.into()).collect();
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_search_retries(mut self, retries: u32) -> Self {
        self.search_retries = retries;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

/// Configuration for cross-view deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Split clusters whose members disagree on discipline, material or
    /// diameter. Default: true.
    pub enforce_structural_match: bool,

    /// Deadline for the clustering call. Default: 60s.
    pub cluster_timeout_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enforce_structural_match: true,
            cluster_timeout_secs: 60,
        }
    }
}

impl DedupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structural_match(mut self, enforce: bool) -> Self {
        self.enforce_structural_match = enforce;
        self
    }

    pub fn with_cluster_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_timeout_secs = timeout.as_secs();
        self
    }

    pub fn cluster_timeout(&self) -> Duration {
        Duration::from_secs(self.cluster_timeout_secs)
    }
}

/// Configuration for a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pages extracted concurrently. Default: 5.
    pub concurrency: usize,

    /// Deadline per extraction attempt. Default: 60s.
    pub page_timeout_secs: u64,

    /// Retries after a failed page extraction. Default: 1.
    pub page_retries: u32,

    /// Unresolved materials used in these disciplines raise CRITICAL alerts.
    ///
    /// Default: water.
    pub critical_disciplines: Vec<Discipline>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            page_timeout_secs: 60,
            page_retries: 1,
            critical_disciplines: vec![Discipline::Water],
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_page_retries(mut self, retries: u32) -> Self {
        self.page_retries = retries;
        self
    }

    pub fn with_critical_disciplines(mut self, disciplines: Vec<Discipline>) -> Self {
        self.critical_disciplines = disciplines;
        self
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn is_critical(&self, discipline: Discipline) -> bool {
        self.critical_disciplines.contains(&discipline)
    }
}

/// Everything a run needs, in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TakeoffConfig {
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

impl TakeoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults, then apply `TAKEOFF_*` overrides from the environment.
    ///
    /// A `.env` file is loaded first if present.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        config.apply_overrides(|name| env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from any key/value source.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = parse_var(&lookup, "TAKEOFF_CONCURRENCY")? {
            self.orchestrator.concurrency = v;
            self.validation.concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_RETRIEVAL_K")? {
            self.validation.retrieval_k = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_RRF_K")? {
            self.retrieval.rrf_k = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_MIN_SUPPORTING_DOCS")? {
            self.validation.min_supporting_documents = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_CONFIDENCE_GATE")? {
            self.validation.confidence_gate = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_MIN_EXTERNAL_SCORE")? {
            self.validation.min_external_score = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_EXPANSION")? {
            self.expansion.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_MAX_VARIANTS")? {
            self.expansion.max_variants = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_PAGE_TIMEOUT_SECS")? {
            self.orchestrator.page_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_SEARCH_TIMEOUT_SECS")? {
            self.validation.search_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_EMBED_TIMEOUT_SECS")? {
            self.retrieval.embed_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, "TAKEOFF_CLUSTER_TIMEOUT_SECS")? {
            self.dedup.cluster_timeout_secs = v;
        }
        if let Some(raw) = lookup("TAKEOFF_ALLOWED_DOMAINS") {
            self.validation.allowed_domains = split_list(&raw);
        }
        if let Some(raw) = lookup("TAKEOFF_CRITICAL_DISCIPLINES") {
            self.orchestrator.critical_disciplines = split_list(&raw)
                .iter()
                .map(|d| d.parse::<Discipline>())
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| TakeoffError::Config(e.into()))?;
        }
        Ok(())
    }

    /// Reject configurations no run could use.
    pub fn validate(&self) -> Result<()> {
        if self.validation.retrieval_k == 0 {
            return Err(TakeoffError::invalid_argument("retrieval_k must be at least 1"));
        }
        if self.validation.concurrency == 0 || self.orchestrator.concurrency == 0 {
            return Err(TakeoffError::invalid_argument("concurrency must be at least 1"));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(TakeoffError::invalid_argument(
                "candidate_multiplier must be at least 1",
            ));
        }
        if self.retrieval.rrf_k < 0.0 {
            return Err(TakeoffError::invalid_argument("rrf_k must not be negative"));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| TakeoffError::Config(format!("{name}={raw:?}: {e}").into())),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
