//! Run orchestrator.
//!
//! Drives one takeoff run through a forward-only state machine:
//!
//! ```text
//! Extracting -> Validating -> Deduplicating -> Assembling -> Done
//!      \             \              \               \
//!       +-------------+--------------+---------------+--> Failed(reason)
//! ```
//!
//! Stage results are collected first and only then written to the run
//! state, so output order never depends on completion order.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use super::prompts::format_extract_prompt;
use super::report::assemble_report;
use super::validate::{MaterialValidator, ValidationOutcome};
use crate::error::{Result, TakeoffError};
use crate::retrieval::{HybridRetriever, QueryExpander};
use crate::stores::StandardsStore;
use crate::traits::{
    ai::AI, extractor::Extractor, searcher::WebSearcher, vector::VectorIndex,
};
use crate::types::{
    config::{OrchestratorConfig, TakeoffConfig},
    item::{CandidateItem, CanonicalItem},
    page::PageImage,
    report::{RunReport, RunWarning},
    validation::MaterialValidation,
};

// =============================================================================
// Run state
// =============================================================================

/// Why a run ended in [`RunPhase::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// Every page failed extraction
    ExtractionUnavailable,

    /// The cancellation token fired
    Cancelled,

    /// Malformed input or configuration
    InvalidArgument,

    /// Any other error escaping a stage
    Internal,
}

impl FailureReason {
    pub fn from_error(error: &TakeoffError) -> Self {
        match error {
            TakeoffError::ExtractionUnavailable { .. } => Self::ExtractionUnavailable,
            TakeoffError::Cancelled => Self::Cancelled,
            TakeoffError::InvalidArgument { .. } => Self::InvalidArgument,
            _ => Self::Internal,
        }
    }
}

/// Phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Extracting,
    Validating,
    Deduplicating,
    Assembling,
    Done,
    Failed(FailureReason),
}

impl RunPhase {
    fn step(&self) -> u8 {
        match self {
            Self::Extracting => 0,
            Self::Validating => 1,
            Self::Deduplicating => 2,
            Self::Assembling => 3,
            Self::Done | Self::Failed(_) => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether moving from `self` to `next` is allowed.
    ///
    /// Phases only advance one step at a time; `Failed` is reachable from
    /// any non-terminal phase and nothing leaves a terminal one.
    pub fn can_advance_to(&self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed(_) => true,
            next => next.step() == self.step() + 1,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Extracting => f.write_str("extracting"),
            Self::Validating => f.write_str("validating"),
            Self::Deduplicating => f.write_str("deduplicating"),
            Self::Assembling => f.write_str("assembling"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed({reason:?})"),
        }
    }
}

/// Everything one run has produced so far.
#[derive(Debug)]
pub struct RunState {
    phase: RunPhase,
    history: Vec<RunPhase>,
    pub candidates: Vec<CandidateItem>,
    pub validations: ValidationOutcome,
    pub canonical: Vec<CanonicalItem>,
    pub warnings: Vec<RunWarning>,
    pub report: Option<RunReport>,
    error: Option<TakeoffError>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: RunPhase::Extracting,
            history: vec![RunPhase::Extracting],
            candidates: Vec::new(),
            validations: ValidationOutcome::default(),
            canonical: Vec::new(),
            warnings: Vec::new(),
            report: None,
            error: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Every phase entered, in order, starting with `Extracting`.
    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    pub fn is_done(&self) -> bool {
        self.phase == RunPhase::Done
    }

    /// The error that failed the run, if any.
    pub fn error(&self) -> Option<&TakeoffError> {
        self.error.as_ref()
    }

    /// Move to the next phase.
    pub fn advance(&mut self, next: RunPhase) -> Result<()> {
        if !self.phase.can_advance_to(next) {
            return Err(TakeoffError::invalid_argument(format!(
                "illegal run transition {} -> {}",
                self.phase, next
            )));
        }
        debug!(from = %self.phase, to = %next, "Run phase change");
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    /// End the run with an error.
    ///
    /// A run that is already terminal keeps its phase.
    pub fn fail(&mut self, error: TakeoffError) {
        let reason = FailureReason::from_error(&error);
        if self.advance(RunPhase::Failed(reason)).is_ok() {
            warn!(reason = ?reason, error = %error, "Run failed");
            self.error = Some(error);
        }
    }

    /// The report of a finished run, or the error that stopped it.
    pub fn into_report(self) -> Result<RunReport> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.report.ok_or_else(|| {
            TakeoffError::invalid_argument(format!("run ended in phase {} without a report", self.phase))
        })
    }

    /// Validation for one material, by name or key.
    pub fn validation(&self, material: &str) -> Option<&MaterialValidation> {
        self.validations.get(material)
    }
}

/// Input for one run.
#[derive(Debug, Clone, Default)]
pub struct RunInput {
    pub pages: Vec<PageImage>,

    /// Extra text appended to the extraction instruction
    pub hint: Option<String>,
}

impl RunInput {
    pub fn new(pages: Vec<PageImage>) -> Self {
        Self { pages, hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs extraction, validation, deduplication and assembly for a page set.
pub struct Orchestrator<A: AI, V: VectorIndex, W: WebSearcher, E: Extractor> {
    extractor: Arc<E>,
    validator: Arc<MaterialValidator<A, V, W>>,
    deduplicator: Arc<Deduplicator<A>>,
    config: OrchestratorConfig,
}

impl<A: AI, V: VectorIndex, W: WebSearcher, E: Extractor> Orchestrator<A, V, W, E> {
    pub fn new(
        extractor: Arc<E>,
        validator: Arc<MaterialValidator<A, V, W>>,
        deduplicator: Arc<Deduplicator<A>>,
    ) -> Self {
        Self::with_config(extractor, validator, deduplicator, OrchestratorConfig::default())
    }

    pub fn with_config(
        extractor: Arc<E>,
        validator: Arc<MaterialValidator<A, V, W>>,
        deduplicator: Arc<Deduplicator<A>>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            extractor,
            validator,
            deduplicator,
            config,
        }
    }

    /// Wire every component from one configuration and index the catalog.
    pub async fn build(
        store: Arc<StandardsStore>,
        ai: Arc<A>,
        vectors: Arc<V>,
        searcher: Arc<W>,
        extractor: Arc<E>,
        config: &TakeoffConfig,
    ) -> Result<Self> {
        config.validate()?;

        let retriever =
            HybridRetriever::with_config(store, Arc::clone(&ai), vectors, config.retrieval.clone());
        let indexed = retriever.index_catalog().await?;
        info!(documents = indexed, "Catalog indexed");

        let expander = QueryExpander::with_config(Arc::new(retriever), config.expansion.clone());
        let validator =
            MaterialValidator::with_config(Arc::new(expander), searcher, config.validation.clone());
        let deduplicator = Deduplicator::with_config(ai, config.dedup.clone());

        Ok(Self::with_config(
            extractor,
            Arc::new(validator),
            Arc::new(deduplicator),
            config.orchestrator.clone(),
        ))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run to completion and return the report.
    pub async fn run(&self, input: RunInput) -> Result<RunReport> {
        self.run_with_cancel(input, &CancellationToken::new()).await
    }

    /// Run with a cancellation token.
    pub async fn run_with_cancel(
        &self,
        input: RunInput,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        self.execute(input, cancel).await.into_report()
    }

    /// Run and return the full state, including the phase history.
    ///
    /// Never returns an error; a failed run ends in [`RunPhase::Failed`].
    pub async fn execute(&self, input: RunInput, cancel: &CancellationToken) -> RunState {
        let mut state = RunState::new();
        if let Err(error) = self.drive(&mut state, &input, cancel).await {
            state.fail(error);
        }
        state
    }

    async fn drive(
        &self,
        state: &mut RunState,
        input: &RunInput,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if input.pages.is_empty() {
            return Err(TakeoffError::invalid_argument("no pages to extract"));
        }
        if self.config.concurrency == 0 {
            return Err(TakeoffError::invalid_argument("concurrency must be at least 1"));
        }

        // Extracting
        let instruction = format_extract_prompt(input.hint.as_deref());
        let (candidates, warnings) = self
            .extract_pages(&input.pages, &instruction, cancel)
            .await?;
        state.candidates = candidates;
        state.warnings.extend(warnings);
        info!(
            pages = input.pages.len(),
            candidates = state.candidates.len(),
            "Extraction complete"
        );

        // Validating
        ensure_not_cancelled(cancel)?;
        state.advance(RunPhase::Validating)?;
        let materials: BTreeSet<String> =
            state.candidates.iter().map(|c| c.material_key()).collect();
        let outcome = self
            .validator
            .validate_with_cancel(materials, cancel)
            .await?;
        state.warnings.extend(outcome.warnings.iter().cloned());
        state.validations = outcome;

        // Deduplicating
        ensure_not_cancelled(cancel)?;
        state.advance(RunPhase::Deduplicating)?;
        let dedup = self.deduplicator.deduplicate(&state.candidates).await;
        if let Some(reason) = dedup.failure {
            state
                .warnings
                .push(RunWarning::DeduplicationReasoningFailure { reason });
        }
        state.canonical = dedup.items;

        // Assembling
        ensure_not_cancelled(cancel)?;
        state.advance(RunPhase::Assembling)?;
        let report = assemble_report(
            &state.candidates,
            &state.validations.validations,
            state.canonical.clone(),
            state.warnings.clone(),
            &self.config.critical_disciplines,
        );
        state.report = Some(report);

        state.advance(RunPhase::Done)?;
        Ok(())
    }

    /// Extract every page through a bounded pool.
    ///
    /// Candidates come back in page input order, then extractor order.
    async fn extract_pages(
        &self,
        pages: &[PageImage],
        instruction: &str,
        cancel: &CancellationToken,
    ) -> Result<(Vec<CandidateItem>, Vec<RunWarning>)> {
        let mut results: Vec<(usize, Option<std::result::Result<Vec<CandidateItem>, String>>)> =
            stream::iter(pages.iter().enumerate())
                .map(|(position, page)| async move {
                    if cancel.is_cancelled() {
                        return (position, None);
                    }
                    (position, Some(self.extract_page(page, instruction, cancel).await))
                })
                .buffer_unordered(self.config.concurrency)
                .collect()
                .await;

        ensure_not_cancelled(cancel)?;
        results.sort_by_key(|(position, _)| *position);

        let mut candidates = Vec::new();
        let mut failed_pages = Vec::new();
        let mut errors = Vec::new();
        for (position, result) in results {
            let page_number = pages[position].page_number;
            match result {
                Some(Ok(items)) => candidates.extend(items),
                Some(Err(error)) => {
                    failed_pages.push(page_number);
                    errors.push(error);
                }
                None => return Err(TakeoffError::Cancelled),
            }
        }

        if failed_pages.len() == pages.len() {
            return Err(TakeoffError::ExtractionUnavailable {
                pages: pages.len(),
                last_error: errors.pop().unwrap_or_default(),
            });
        }

        let mut warnings = Vec::new();
        if !failed_pages.is_empty() {
            warn!(pages = ?failed_pages, "Continuing without failed pages");
            warnings.push(RunWarning::PartialExtractionFailure {
                pages: failed_pages,
                errors,
            });
        }

        // Items without a material cannot be validated
        let extracted = candidates.len();
        let mut blank_pages = BTreeSet::new();
        candidates.retain(|item| {
            let blank = item.material_key().is_empty();
            if blank {
                blank_pages.insert(item.source_page);
            }
            !blank
        });
        if !blank_pages.is_empty() {
            let count = extracted - candidates.len();
            warn!(count, pages = ?blank_pages, "Dropping items without a material");
            warnings.push(RunWarning::BlankMaterialDropped {
                pages: blank_pages.into_iter().collect(),
                count,
            });
        }

        Ok((candidates, warnings))
    }

    /// Extract one page with a deadline and bounded retries.
    ///
    /// No retry starts once `cancel` has fired.
    async fn extract_page(
        &self,
        page: &PageImage,
        instruction: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<CandidateItem>, String> {
        let deadline = self.config.page_timeout();
        let max_attempts = self.config.page_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 && cancel.is_cancelled() {
                debug!(page = page.page_number, attempt, "Extraction retry skipped after cancellation");
                return Err(TakeoffError::Cancelled.to_string());
            }
            match timeout(deadline, self.extractor.extract(page, instruction)).await {
                Ok(Ok(extraction)) => {
                    let mut items = extraction.into_items();
                    for item in &mut items {
                        item.source_page = page.page_number;
                    }
                    debug!(page = page.page_number, items = items.len(), attempt, "Page extracted");
                    return Ok(items);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = TakeoffError::Timeout {
                        operation: "page extraction",
                        after: deadline,
                    }
                    .to_string()
                }
            }
            warn!(page = page.page_number, attempt, error = %last_error, "Page extraction failed");
        }

        Err(last_error)
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(TakeoffError::Cancelled)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryVectorIndex;
    use crate::testing::{page, sample_catalog, MockAI, MockExtractor};
    use crate::traits::{ai::ItemCluster, searcher::MockWebSearcher};
    use crate::types::{item::SourceView, report::Severity, standard::Discipline};
    use std::time::Duration;

    type TestOrchestrator = Orchestrator<MockAI, MemoryVectorIndex, MockWebSearcher, MockExtractor>;

    async fn orchestrator(ai: MockAI, extractor: MockExtractor) -> TestOrchestrator {
        Orchestrator::build(
            Arc::new(sample_catalog()),
            Arc::new(ai),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockWebSearcher::new()),
            Arc::new(extractor),
            &TakeoffConfig::default(),
        )
        .await
        .unwrap()
    }

    fn rcp(page: u32) -> CandidateItem {
        CandidateItem::new(Discipline::Storm, "RCP")
            .with_diameter(15.0)
            .with_length(100.0)
            .on_page(page, SourceView::Plan)
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let mut state = RunState::new();
        assert!(state.advance(RunPhase::Deduplicating).is_err());
        state.advance(RunPhase::Validating).unwrap();
        assert!(state.advance(RunPhase::Validating).is_err());
        assert!(state.advance(RunPhase::Extracting).is_err());
        state.fail(TakeoffError::Cancelled);
        assert_eq!(state.phase(), RunPhase::Failed(FailureReason::Cancelled));
        assert!(state.advance(RunPhase::Deduplicating).is_err());
        assert_eq!(
            state.history(),
            &[
                RunPhase::Extracting,
                RunPhase::Validating,
                RunPhase::Failed(FailureReason::Cancelled)
            ]
        );
    }

    #[tokio::test]
    async fn test_full_run_reaches_done() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![rcp(0), CandidateItem::new(Discipline::Water, "DIP")])
            .with_no_items(2);
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let state = orchestrator
            .execute(RunInput::new(vec![page(1), page(2)]), &CancellationToken::new())
            .await;

        assert!(state.is_done());
        assert_eq!(
            state.history(),
            &[
                RunPhase::Extracting,
                RunPhase::Validating,
                RunPhase::Deduplicating,
                RunPhase::Assembling,
                RunPhase::Done
            ]
        );
        assert_eq!(state.candidates.len(), 2);
        assert!(state.candidates.iter().all(|c| c.source_page == 1));
        let report = state.into_report().unwrap();
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.materials.len(), 2);
    }

    #[tokio::test]
    async fn test_blank_material_items_are_dropped_with_warning() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![rcp(1), CandidateItem::new(Discipline::Water, "   ")])
            .with_page(2, vec![CandidateItem::new(Discipline::Storm, "")]);
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let state = orchestrator
            .execute(RunInput::new(vec![page(1), page(2)]), &CancellationToken::new())
            .await;
        assert!(state.is_done());
        assert_eq!(state.candidates.len(), 1);

        let report = state.into_report().unwrap();
        assert_eq!(report.summary.total, 1);
        for item in &report.items {
            assert!(report.material(&item.item.material_key()).is_some());
        }
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            RunWarning::BlankMaterialDropped { pages, count: 2 } if pages == &vec![1, 2]
        )));
        assert!(report
            .alerts
            .iter()
            .any(|a| a.severity == Severity::Warning && a.material.is_none()));
    }

    #[tokio::test]
    async fn test_empty_page_set_is_invalid() {
        let orchestrator = orchestrator(MockAI::new(), MockExtractor::new()).await;
        let state = orchestrator
            .execute(RunInput::default(), &CancellationToken::new())
            .await;
        assert_eq!(state.phase(), RunPhase::Failed(FailureReason::InvalidArgument));
    }

    #[tokio::test]
    async fn test_candidates_follow_page_input_order() {
        let extractor = MockExtractor::new()
            .with_page(5, vec![rcp(0).with_label("five")])
            .with_page(2, vec![rcp(0).with_label("two-a"), rcp(0).with_label("two-b")])
            .with_delay(5, Duration::from_millis(20));
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let state = orchestrator
            .execute(RunInput::new(vec![page(5), page(2)]), &CancellationToken::new())
            .await;
        let labels: Vec<_> = state.candidates.iter().map(|c| c.raw_label.as_str()).collect();
        assert_eq!(labels, vec!["five", "two-a", "two-b"]);
        assert_eq!(state.candidates[0].source_page, 5);
        assert_eq!(state.candidates[1].source_page, 2);
    }

    #[tokio::test]
    async fn test_single_failure_is_retried() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![rcp(1)])
            .failing_page(1, 1);
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let report = orchestrator.run(RunInput::new(vec![page(1)])).await.unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.summary.total, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_warns_and_continues() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![rcp(1)])
            .always_failing_page(2);
        let extractor = Arc::new(extractor);
        let orchestrator = Orchestrator::build(
            Arc::new(sample_catalog()),
            Arc::new(MockAI::new()),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockWebSearcher::new()),
            Arc::clone(&extractor),
            &TakeoffConfig::default(),
        )
        .await
        .unwrap();

        let report = orchestrator
            .run(RunInput::new(vec![page(1), page(2)]))
            .await
            .unwrap();
        assert_eq!(extractor.calls_for(2), 2);
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            RunWarning::PartialExtractionFailure { pages, .. } if pages == &vec![2]
        )));
        assert!(report
            .alerts
            .iter()
            .any(|a| a.severity == Severity::Warning && a.material.is_none()));
    }

    #[tokio::test]
    async fn test_all_pages_failing_is_extraction_unavailable() {
        let extractor = MockExtractor::new()
            .always_failing_page(1)
            .always_failing_page(2);
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let err = orchestrator
            .run(RunInput::new(vec![page(1), page(2)]))
            .await
            .unwrap_err();
        assert!(matches!(err, TakeoffError::ExtractionUnavailable { pages: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_timeout_counts_as_failure() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![rcp(1)])
            .with_delay(2, Duration::from_secs(600));
        let orchestrator = orchestrator(MockAI::new(), extractor).await;

        let report = orchestrator
            .run(RunInput::new(vec![page(1), page(2)]))
            .await
            .unwrap();
        assert!(report.warnings.iter().any(|w| matches!(
            w,
            RunWarning::PartialExtractionFailure { errors, .. } if errors[0].contains("timed out")
        )));
    }

    #[tokio::test]
    async fn test_cancelled_run_fails_with_cancelled() {
        let extractor = MockExtractor::new().with_page(1, vec![rcp(1)]);
        let orchestrator = orchestrator(MockAI::new(), extractor).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let state = orchestrator
            .execute(RunInput::new(vec![page(1)]), &cancel)
            .await;
        assert_eq!(state.phase(), RunPhase::Failed(FailureReason::Cancelled));
        assert!(matches!(state.error(), Some(TakeoffError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_extraction_retry_after_cancellation() {
        let extractor = Arc::new(
            MockExtractor::new()
                .with_page(1, vec![rcp(1)])
                .failing_page(1, 1)
                .with_delay(1, Duration::from_secs(1)),
        );
        let orchestrator = Orchestrator::build(
            Arc::new(sample_catalog()),
            Arc::new(MockAI::new()),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockWebSearcher::new()),
            Arc::clone(&extractor),
            &TakeoffConfig::default(),
        )
        .await
        .unwrap();
        let cancel = CancellationToken::new();

        let (state, _) = tokio::join!(
            orchestrator.execute(RunInput::new(vec![page(1)]), &cancel),
            async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            }
        );

        assert_eq!(state.phase(), RunPhase::Failed(FailureReason::Cancelled));
        assert_eq!(extractor.calls_for(1), 1);
    }

    #[tokio::test]
    async fn test_dedup_failure_becomes_warning() {
        let ai = MockAI::new();
        ai.fail_clustering(true);
        let extractor = MockExtractor::new().with_page(1, vec![rcp(1), rcp(1)]);
        let orchestrator = orchestrator(ai, extractor).await;

        let report = orchestrator.run(RunInput::new(vec![page(1)])).await.unwrap();
        assert_eq!(report.summary.total, 2);
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, RunWarning::DeduplicationReasoningFailure { .. })));
    }

    #[tokio::test]
    async fn test_hint_reaches_extractor() {
        let extractor = Arc::new(MockExtractor::new().with_page(1, vec![rcp(1)]));
        let ai = MockAI::new().with_clusters(vec![ItemCluster::new([0])]);
        let orchestrator = Orchestrator::build(
            Arc::new(sample_catalog()),
            Arc::new(ai),
            Arc::new(MemoryVectorIndex::new()),
            Arc::new(MockWebSearcher::new()),
            Arc::clone(&extractor),
            &TakeoffConfig::default(),
        )
        .await
        .unwrap();

        orchestrator
            .run(RunInput::new(vec![page(1)]).with_hint("storm only"))
            .await
            .unwrap();
        assert!(extractor.calls()[0].instruction.contains("Project notes: storm only"));
    }
}
