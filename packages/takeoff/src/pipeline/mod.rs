//! Takeoff pipeline.
//!
//! The pipeline runs:
//! - Extraction (one collaborator call per page, bounded pool)
//! - Material validation (hybrid retrieval + external escalation)
//! - Deduplication (AI clustering with structural checks)
//! - Report assembly (alerts, warnings, summary)
//!
//! [`Orchestrator`] ties them together as a forward-only state machine.

pub mod dedup;
pub mod extract;
pub mod orchestrator;
pub mod prompts;
pub mod report;
pub mod validate;

pub use dedup::{
    build_canonical, parse_cluster_response, validate_clusters, ClusterRejection, DedupOutcome,
    Deduplicator,
};
pub use extract::parse_extraction_response;
pub use orchestrator::{FailureReason, Orchestrator, RunInput, RunPhase, RunState};
pub use prompts::{
    extract_prompt_hash, format_cluster_prompt, format_expand_query_prompt, format_extract_prompt,
    CLUSTER_PROMPT, EXPAND_QUERY_PROMPT, EXTRACT_PROMPT, EXTRACT_SYSTEM_PROMPT,
};
pub use report::{assemble_report, build_alerts};
pub use validate::{MaterialValidator, ValidationOutcome};
