//! Material validation with confidence-gated escalation.
//!
//! For each distinct material: retrieve from the catalog, decide whether the
//! catalog actually mentions it, and escalate to external search when it
//! does not (or when the catalog backs it with too few documents).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, SearchError, TakeoffError};
use crate::retrieval::{text::contains_phrase, QueryExpander};
use crate::traits::{
    ai::AI,
    searcher::{SearchRequest, SearchResult, WebSearcher},
    vector::VectorIndex,
};
use crate::types::{
    config::ValidationConfig,
    item::material_key,
    report::RunWarning,
    standard::RetrievalHit,
    validation::{MaterialStatus, MaterialValidation, SearchFailure},
};

/// Validations for a set of materials, keyed and ordered by material.
#[derive(Debug, Clone, Default)]
pub struct ValidationOutcome {
    pub validations: BTreeMap<String, MaterialValidation>,
    pub warnings: Vec<RunWarning>,
}

impl ValidationOutcome {
    pub fn get(&self, material: &str) -> Option<&MaterialValidation> {
        self.validations.get(&material_key(material))
    }

    pub fn len(&self) -> usize {
        self.validations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validations.is_empty()
    }

    /// Materials with the given status, in key order.
    pub fn with_status(&self, status: MaterialStatus) -> impl Iterator<Item = &MaterialValidation> {
        self.validations.values().filter(move |v| v.status == status)
    }
}

/// Query used to look a material up in the catalog.
pub fn catalog_query(material: &str) -> String {
    format!("{material} specifications")
}

/// Query used for external escalation.
pub fn external_query(material: &str) -> String {
    format!("{material} material specifications standard")
}

/// Whether a document text names the material as a whole token.
///
/// Abbreviation expansions only widen retrieval; they never count as a
/// mention, since one abbreviation can stand for unrelated things.
pub fn mentions_material(text: &str, material: &str) -> bool {
    contains_phrase(text, material)
}

/// Whether a search result counts as evidence for a material.
pub fn is_external_match(result: &SearchResult, material: &str, min_score: f32) -> bool {
    let mentioned = result
        .snippet
        .as_deref()
        .is_some_and(|s| contains_phrase(s, material))
        || result
            .title
            .as_deref()
            .is_some_and(|t| contains_phrase(t, material));
    let scored = result.score.map_or(true, |score| score >= min_score);
    mentioned && scored
}

/// Material validation engine.
pub struct MaterialValidator<A: AI, V: VectorIndex, W: WebSearcher> {
    expander: Arc<QueryExpander<A, V>>,
    searcher: Arc<W>,
    config: ValidationConfig,
}

impl<A: AI, V: VectorIndex, W: WebSearcher> MaterialValidator<A, V, W> {
    pub fn new(expander: Arc<QueryExpander<A, V>>, searcher: Arc<W>) -> Self {
        Self::with_config(expander, searcher, ValidationConfig::default())
    }

    pub fn with_config(
        expander: Arc<QueryExpander<A, V>>,
        searcher: Arc<W>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            expander,
            searcher,
            config,
        }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a set of materials.
    ///
    /// Keys are trimmed and upper-cased; blank entries are ignored.
    pub async fn validate<I, S>(&self, materials: I) -> Result<ValidationOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.validate_with_cancel(materials, &CancellationToken::new())
            .await
    }

    /// Validate with cancellation support.
    ///
    /// Once cancelled, no further material starts; in-flight ones finish and
    /// the call returns [`TakeoffError::Cancelled`].
    pub async fn validate_with_cancel<I, S>(
        &self,
        materials: I,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.config.retrieval_k < 1 {
            return Err(TakeoffError::invalid_argument("retrieval_k must be at least 1"));
        }

        let keys: BTreeSet<String> = materials
            .into_iter()
            .map(|m| material_key(m.as_ref()))
            .filter(|k| !k.is_empty())
            .collect();

        let results: Vec<Result<(MaterialValidation, Vec<RunWarning>)>> = stream::iter(keys)
            .map(|key| async move {
                if cancel.is_cancelled() {
                    return Err(TakeoffError::Cancelled);
                }
                self.validate_one(&key, cancel).await
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        if cancel.is_cancelled() {
            return Err(TakeoffError::Cancelled);
        }

        let mut outcome = ValidationOutcome::default();
        let mut warnings: BTreeMap<String, Vec<RunWarning>> = BTreeMap::new();
        for result in results {
            let (validation, material_warnings) = result?;
            warnings.insert(validation.material.clone(), material_warnings);
            outcome
                .validations
                .insert(validation.material.clone(), validation);
        }
        outcome.warnings = warnings.into_values().flatten().collect();

        info!(
            materials = outcome.len(),
            known = outcome.validations.values().filter(|v| v.is_known()).count(),
            escalated = outcome.validations.values().filter(|v| v.was_escalated()).count(),
            unresolved = outcome.with_status(MaterialStatus::Unresolved).count(),
            "Material validation complete"
        );

        Ok(outcome)
    }

    /// Validate one normalized material key.
    async fn validate_one(
        &self,
        material: &str,
        cancel: &CancellationToken,
    ) -> Result<(MaterialValidation, Vec<RunWarning>)> {
        let mut warnings = Vec::new();
        let hits = self
            .expander
            .retrieve_expanded(&catalog_query(material), self.config.retrieval_k, None)
            .await?;

        if hits.is_empty() {
            debug!(material, "No catalog documents retrieved");
            warnings.push(RunWarning::RetrievalEmpty {
                material: material.to_string(),
            });
        }

        let supporting = self.supporting_documents(material, &hits);
        let known = !supporting.is_empty();
        let thin = known
            && self.config.confidence_gate
            && supporting.len() < self.config.min_supporting_documents;

        let mut validation = MaterialValidation::new(material, MaterialStatus::Known)
            .with_supporting(supporting);

        if known && !thin {
            debug!(material, documents = validation.supporting_document_ids.len(), "Material known");
            return Ok((validation, warnings));
        }
        if !known {
            let store = self.expander.retriever().store();
            if let Some(phrase) = store.expand_abbreviation(material) {
                debug!(material, phrase, "Only the abbreviation expansion may appear; escalating");
            }
        }

        let request = SearchRequest::new(external_query(material))
            .with_domains(self.config.allowed_domains.iter().cloned())
            .with_max_results(self.config.max_external_results);
        let (result, attempts) = self.search_with_retry(&request, cancel).await;
        validation.search_attempts = attempts;

        let evidence = match result {
            Ok(results) => results
                .into_iter()
                .filter(|r| is_external_match(r, material, self.config.min_external_score))
                .collect::<Vec<_>>(),
            Err(error) => {
                warn!(material, attempts, error = %error, "External search failed");
                warnings.push(RunWarning::ExternalSearchFailure {
                    material: material.to_string(),
                    error: error.clone(),
                });
                validation.search_failure = Some(SearchFailure { attempts, error });
                Vec::new()
            }
        };

        if !evidence.is_empty() {
            validation.external_evidence = Some(format_evidence(&evidence));
            validation.external_sources = evidence.iter().map(|r| r.url.to_string()).collect();
        }

        validation.status = match (thin, evidence.is_empty()) {
            (true, _) => MaterialStatus::KnownThinEvidence,
            (false, false) => MaterialStatus::UnresolvedButFound,
            (false, true) => MaterialStatus::Unresolved,
        };

        debug!(
            material,
            status = ?validation.status,
            evidence = evidence.len(),
            "Material escalated"
        );
        Ok((validation, warnings))
    }

    /// Ids of retrieved documents that mention the material, in retrieval order.
    fn supporting_documents(&self, material: &str, hits: &[RetrievalHit]) -> Vec<String> {
        hits.iter()
            .filter(|h| mentions_material(h.text(), material))
            .map(|h| h.document.id.clone())
            .collect()
    }

    /// Run a search with a per-attempt deadline and bounded retries.
    ///
    /// Returns the final outcome and the number of attempts made. No retry
    /// starts once `cancel` has fired.
    async fn search_with_retry(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> (std::result::Result<Vec<SearchResult>, String>, u32) {
        let deadline = self.config.search_timeout();
        let max_attempts = self.config.search_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 && cancel.is_cancelled() {
                debug!(query = %request.query, attempt, "Search retry skipped after cancellation");
                return (Err(TakeoffError::Cancelled.to_string()), attempt - 1);
            }
            match timeout(deadline, self.searcher.search(request)).await {
                Ok(Ok(results)) => return (Ok(results), attempt),
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = SearchError::Timeout(deadline).to_string(),
            }
            if attempt < max_attempts {
                debug!(query = %request.query, attempt, error = %last_error, "Retrying external search");
            }
        }

        (Err(last_error), max_attempts)
    }
}

fn format_evidence(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| {
            let text = r
                .snippet
                .as_deref()
                .or(r.title.as_deref())
                .unwrap_or_default()
                .trim();
            format!("{text} (source: {})", r.url)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::HybridRetriever;
    use crate::stores::{MemoryVectorIndex, StandardsStore};
    use crate::testing::{rcp_catalog, sample_catalog, MockAI};
    use crate::traits::searcher::MockWebSearcher;
    use crate::types::config::ExpansionConfig;
    use std::time::Duration;

    type TestValidator = MaterialValidator<MockAI, MemoryVectorIndex, MockWebSearcher>;

    async fn validator(
        store: StandardsStore,
        searcher: MockWebSearcher,
        config: ValidationConfig,
    ) -> (TestValidator, Arc<MockWebSearcher>) {
        let retriever = HybridRetriever::new(
            Arc::new(store),
            Arc::new(MockAI::new()),
            Arc::new(MemoryVectorIndex::new()),
        );
        retriever.index_catalog().await.unwrap();
        let expander = QueryExpander::with_config(Arc::new(retriever), ExpansionConfig::default());
        let searcher = Arc::new(searcher);
        let validator =
            MaterialValidator::with_config(Arc::new(expander), Arc::clone(&searcher), config);
        (validator, searcher)
    }

    fn result(url: &str, snippet: &str, score: f32) -> SearchResult {
        SearchResult::from_url(url)
            .unwrap()
            .with_snippet(snippet)
            .with_score(score)
    }

    #[test]
    fn test_external_match_requires_token_and_score() {
        let good = result("https://astm.org/f2620", "FPVC fusible pipe per ASTM F2620", 0.8);
        assert!(is_external_match(&good, "FPVC", 0.5));
        assert!(!is_external_match(&good, "PVC", 0.5));

        let low = result("https://astm.org/f2620", "FPVC fusible pipe", 0.2);
        assert!(!is_external_match(&low, "FPVC", 0.5));

        let unscored = SearchResult::from_url("https://awwa.org/x")
            .unwrap()
            .with_title("FPVC guidance");
        assert!(is_external_match(&unscored, "FPVC", 0.5));
    }

    #[tokio::test]
    async fn test_known_material_with_gate_disabled() {
        let config = ValidationConfig::default().with_confidence_gate(false);
        let (validator, searcher) = validator(rcp_catalog(), MockWebSearcher::new(), config).await;

        let outcome = validator.validate(["RCP"]).await.unwrap();
        let rcp = outcome.get("RCP").unwrap();
        assert_eq!(rcp.status, MaterialStatus::Known);
        assert_eq!(rcp.supporting_document_ids, vec!["storm-rcp"]);
        assert!(!rcp.was_escalated());
        assert_eq!(searcher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_thin_evidence_escalates_but_stays_known() {
        let (validator, searcher) =
            validator(rcp_catalog(), MockWebSearcher::new(), ValidationConfig::default()).await;

        let outcome = validator.validate(["rcp "]).await.unwrap();
        let rcp = outcome.get("RCP").unwrap();
        assert_eq!(rcp.status, MaterialStatus::KnownThinEvidence);
        assert!(rcp.is_known());
        assert!(rcp.was_escalated());
        assert_eq!(searcher.call_count(), 1);
        assert_eq!(rcp.search_attempts, 1);
    }

    #[tokio::test]
    async fn test_unknown_material_is_unresolved_when_search_lacks_it() {
        let searcher = MockWebSearcher::new().with_results(
            "FPVC material specifications standard",
            vec![result("https://www.astm.org/d3034", "PVC sewer pipe per ASTM D3034", 0.9)],
        );
        let (validator, searcher) =
            validator(rcp_catalog(), searcher, ValidationConfig::default()).await;

        let outcome = validator.validate(["FPVC"]).await.unwrap();
        let fpvc = outcome.get("FPVC").unwrap();
        assert_eq!(fpvc.status, MaterialStatus::Unresolved);
        assert!(fpvc.supporting_document_ids.is_empty());
        assert!(fpvc.external_evidence.is_none());

        let calls = searcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].query, "FPVC material specifications standard");
        assert_eq!(calls[0].include_domains.len(), 4);
        assert_eq!(calls[0].max_results, 5);
    }

    #[tokio::test]
    async fn test_unknown_material_found_externally() {
        let searcher = MockWebSearcher::new().with_fallback(vec![result(
            "https://www.astm.org/f2620",
            "FPVC fusible polyvinyl chloride pipe per ASTM F2620",
            0.9,
        )]);
        let (validator, _) = validator(rcp_catalog(), searcher, ValidationConfig::default()).await;

        let outcome = validator.validate(["FPVC"]).await.unwrap();
        let fpvc = outcome.get("FPVC").unwrap();
        assert_eq!(fpvc.status, MaterialStatus::UnresolvedButFound);
        assert!(fpvc.external_evidence.as_deref().unwrap().contains("source: https://www.astm.org/f2620"));
        assert_eq!(fpvc.external_sources, vec!["https://www.astm.org/f2620"]);
    }

    #[tokio::test]
    async fn test_substring_is_not_a_match() {
        // "PVC" appears only inside "FPVC"
        let store = StandardsStore::from_documents(vec![crate::types::standard::StandardDocument::new(
            "fpvc",
            "FPVC pipe shall be fused per manufacturer procedure.",
            crate::types::standard::Discipline::Water,
            crate::types::standard::Category::Material,
        )])
        .unwrap()
        .with_abbreviations(Default::default());
        let (validator, _) = validator(store, MockWebSearcher::new(), ValidationConfig::default()).await;

        let outcome = validator.validate(["PVC"]).await.unwrap();
        assert_eq!(outcome.get("PVC").unwrap().status, MaterialStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_written_abbreviation_counts_as_mention() {
        let config = ValidationConfig::default().with_confidence_gate(false);
        let (validator, _) = validator(sample_catalog(), MockWebSearcher::new(), config).await;

        // "HYD" is never written; "hydrant" is not in the catalog either
        let outcome = validator.validate(["DIP", "HYD"]).await.unwrap();
        assert!(outcome.get("DIP").unwrap().is_known());
        assert_eq!(outcome.get("HYD").unwrap().status, MaterialStatus::Unresolved);
    }

    #[tokio::test]
    async fn test_abbreviation_expansion_is_not_a_mention() {
        // DI on a water main means ductile iron, not "drain inlet"
        let store = StandardsStore::from_documents(vec![crate::types::standard::StandardDocument::new(
            "storm-inlet",
            "Storm drain inlet grates shall be cast iron, bicycle safe.",
            crate::types::standard::Discipline::Storm,
            crate::types::standard::Category::Material,
        )])
        .unwrap();
        assert_eq!(store.expand_abbreviation("DI"), Some("drain inlet"));

        let config = ValidationConfig::default().with_confidence_gate(false);
        let (validator, searcher) = validator(store, MockWebSearcher::new(), config).await;

        let outcome = validator.validate(["DI"]).await.unwrap();
        let di = outcome.get("DI").unwrap();
        assert!(!di.is_known());
        assert!(di.supporting_document_ids.is_empty());
        assert_eq!(searcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_search_failure_retries_once_then_degrades() {
        let searcher = MockWebSearcher::new().failing(5);
        let (validator, searcher) =
            validator(rcp_catalog(), searcher, ValidationConfig::default()).await;

        let outcome = validator.validate(["FPVC"]).await.unwrap();
        let fpvc = outcome.get("FPVC").unwrap();
        assert_eq!(fpvc.status, MaterialStatus::Unresolved);
        assert_eq!(fpvc.search_attempts, 2);
        assert!(fpvc.search_failure.is_some());
        assert_eq!(searcher.call_count(), 2);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| matches!(w, RunWarning::ExternalSearchFailure { material, .. } if material == "FPVC")));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_single_failure() {
        let searcher = MockWebSearcher::new().failing(1).with_fallback(vec![result(
            "https://awwa.org/fpvc",
            "FPVC",
            0.7,
        )]);
        let (validator, _) = validator(rcp_catalog(), searcher, ValidationConfig::default()).await;

        let fpvc = validator.validate(["FPVC"]).await.unwrap().get("FPVC").cloned().unwrap();
        assert_eq!(fpvc.status, MaterialStatus::UnresolvedButFound);
        assert_eq!(fpvc.search_attempts, 2);
        assert!(fpvc.search_failure.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_timeout_counts_as_failure() {
        let searcher = MockWebSearcher::new().with_delay(Duration::from_secs(60));
        let (validator, _) = validator(rcp_catalog(), searcher, ValidationConfig::default()).await;

        let fpvc = validator.validate(["FPVC"]).await.unwrap().get("FPVC").cloned().unwrap();
        assert_eq!(fpvc.status, MaterialStatus::Unresolved);
        assert!(fpvc.search_failure.unwrap().error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_validation_is_idempotent_and_ordered() {
        let searcher = MockWebSearcher::new();
        let (validator, _) = validator(sample_catalog(), searcher, ValidationConfig::default()).await;

        let materials = ["PVC", "rcp", "FPVC", "", "  ", "DIP"];
        let first = validator.validate(materials).await.unwrap();
        let second = validator.validate(materials).await.unwrap();

        let keys: Vec<_> = first.validations.keys().cloned().collect();
        assert_eq!(keys, vec!["DIP", "FPVC", "PVC", "RCP"]);
        assert_eq!(first.validations, second.validations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_search_retry_after_cancellation() {
        let searcher = MockWebSearcher::new()
            .failing(5)
            .with_delay(Duration::from_secs(1));
        let (validator, searcher) =
            validator(rcp_catalog(), searcher, ValidationConfig::default()).await;
        let cancel = CancellationToken::new();

        let (result, _) = tokio::join!(validator.validate_with_cancel(["FPVC"], &cancel), async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        assert!(matches!(result, Err(TakeoffError::Cancelled)));
        assert_eq!(searcher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (validator, searcher) =
            validator(rcp_catalog(), MockWebSearcher::new(), ValidationConfig::default()).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = validator
            .validate_with_cancel(["FPVC"], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, TakeoffError::Cancelled));
        assert_eq!(searcher.call_count(), 0);
    }
}
