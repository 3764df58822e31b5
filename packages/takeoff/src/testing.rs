//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the takeoff core
//! without making real AI, vision or network calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::{Result, TakeoffError};
use crate::retrieval::text::tokenize;
use crate::stores::StandardsStore;
use crate::traits::{
    ai::{ItemCluster, AI},
    extractor::Extractor,
};
use crate::types::{
    item::CandidateItem,
    page::{PageExtraction, PageImage},
    standard::{Category, Discipline, StandardDocument},
};

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted failure switches and delays for [`MockAI`].
#[derive(Debug, Default, Clone)]
struct Faults {
    embed_fails: bool,
    expand_fails: bool,
    cluster_fails: bool,
    embed_delay: Option<Duration>,
    expand_delay: Option<Duration>,
    cluster_delay: Option<Duration>,
}

/// A mock AI implementation for testing.
///
/// Embeddings are hashed bag-of-words vectors, so texts sharing tokens are
/// close and retrieval tests behave sensibly without a model.
#[derive(Default)]
pub struct MockAI {
    /// Predefined query paraphrases
    expansions: Arc<RwLock<HashMap<String, Vec<String>>>>,

    /// Predefined clustering answer
    clusters: Arc<RwLock<Vec<ItemCluster>>>,

    /// Predefined embeddings by text
    embeddings: Arc<RwLock<HashMap<String, Vec<f32>>>>,

    /// Default embedding dimension
    embedding_dim: usize,

    faults: Arc<RwLock<Faults>>,

    /// Call tracking for assertions
    calls: Arc<RwLock<Vec<MockAICall>>>,
}

/// Record of a call made to the mock AI.
#[derive(Debug, Clone, PartialEq)]
pub enum MockAICall {
    Embed { text_len: usize },
    EmbedBatch { count: usize },
    ExpandQuery { query: String, n: usize },
    ClusterItems { item_count: usize },
}

impl MockAI {
    /// Create a new mock AI with default behavior.
    pub fn new() -> Self {
        Self {
            embedding_dim: 256,
            ..Default::default()
        }
    }

    /// Set the embedding dimension.
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Add a predefined paraphrase list for a query.
    pub fn with_expansion(self, query: impl Into<String>, paraphrases: Vec<String>) -> Self {
        write(&self.expansions).insert(query.into(), paraphrases);
        self
    }

    /// Answer every clustering call with these clusters.
    pub fn with_clusters(self, clusters: Vec<ItemCluster>) -> Self {
        *write(&self.clusters) = clusters;
        self
    }

    /// Add a predefined embedding for text.
    pub fn with_embedding(self, text: impl Into<String>, embedding: Vec<f32>) -> Self {
        write(&self.embeddings).insert(text.into(), embedding);
        self
    }

    /// Make embedding calls fail.
    pub fn fail_embeddings(&self, fail: bool) {
        write(&self.faults).embed_fails = fail;
    }

    /// Make paraphrase calls fail.
    pub fn fail_expansions(&self, fail: bool) {
        write(&self.faults).expand_fails = fail;
    }

    /// Make clustering calls fail.
    pub fn fail_clustering(&self, fail: bool) {
        write(&self.faults).cluster_fails = fail;
    }

    pub fn set_embed_delay(&self, delay: Option<Duration>) {
        write(&self.faults).embed_delay = delay;
    }

    pub fn set_expand_delay(&self, delay: Option<Duration>) {
        write(&self.faults).expand_delay = delay;
    }

    pub fn set_cluster_delay(&self, delay: Option<Duration>) {
        write(&self.faults).cluster_delay = delay;
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockAICall> {
        read(&self.calls).clone()
    }

    /// Clear call history.
    pub fn clear_calls(&self) {
        write(&self.calls).clear();
    }

    /// Number of clustering calls made.
    pub fn cluster_calls(&self) -> usize {
        read(&self.calls)
            .iter()
            .filter(|c| matches!(c, MockAICall::ClusterItems { .. }))
            .count()
    }

    fn record(&self, call: MockAICall) {
        write(&self.calls).push(call);
    }

    fn faults(&self) -> Faults {
        read(&self.faults).clone()
    }

    /// Hashed bag-of-words embedding, L2-normalized.
    fn generate_deterministic_embedding(&self, text: &str) -> Vec<f32> {
        use sha2::{Digest, Sha256};

        let dim = self.embedding_dim.max(1);
        let mut vector = vec![0.0f32; dim];
        for token in tokenize(text) {
            let hash = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]) as usize % dim;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn embedding_for(&self, text: &str) -> Vec<f32> {
        read(&self.embeddings)
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.generate_deterministic_embedding(text))
    }
}

fn mock_failure(operation: &str) -> TakeoffError {
    TakeoffError::AI(format!("mock {operation} failure").into())
}

#[async_trait]
impl AI for MockAI {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.record(MockAICall::Embed {
            text_len: text.len(),
        });

        let faults = self.faults();
        if let Some(delay) = faults.embed_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.embed_fails {
            return Err(mock_failure("embed"));
        }

        // Return predefined embedding or generate deterministic one
        Ok(self.embedding_for(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.record(MockAICall::EmbedBatch { count: texts.len() });

        if self.faults().embed_fails {
            return Err(mock_failure("embed"));
        }
        Ok(texts.iter().map(|t| self.embedding_for(t)).collect())
    }

    async fn expand_query(&self, query: &str, n: usize) -> Result<Vec<String>> {
        self.record(MockAICall::ExpandQuery {
            query: query.to_string(),
            n,
        });

        let faults = self.faults();
        if let Some(delay) = faults.expand_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.expand_fails {
            return Err(mock_failure("expand"));
        }

        // Unscripted queries get no paraphrases
        Ok(read(&self.expansions).get(query).cloned().unwrap_or_default())
    }

    async fn cluster_items(&self, items: &[CandidateItem]) -> Result<Vec<ItemCluster>> {
        self.record(MockAICall::ClusterItems {
            item_count: items.len(),
        });

        let faults = self.faults();
        if let Some(delay) = faults.cluster_delay {
            tokio::time::sleep(delay).await;
        }
        if faults.cluster_fails {
            return Err(mock_failure("cluster"));
        }

        Ok(read(&self.clusters).clone())
    }
}

/// How the mock extractor answers one page.
#[derive(Debug, Clone)]
enum PageScript {
    Items(Vec<CandidateItem>),
    NoItems,
}

/// A mock extractor for testing.
///
/// Pages without a script report no items.
#[derive(Default)]
pub struct MockExtractor {
    pages: Arc<RwLock<HashMap<u32, PageScript>>>,

    /// Remaining scripted failures per page (`u32::MAX` = always)
    failures: Arc<RwLock<HashMap<u32, u32>>>,

    delays: Arc<RwLock<HashMap<u32, Duration>>>,

    /// Call tracking
    calls: Arc<RwLock<Vec<MockExtractorCall>>>,
}

/// Record of a call made to the mock extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct MockExtractorCall {
    pub page_number: u32,
    pub instruction: String,
}

impl MockExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the items a page returns.
    pub fn with_page(self, page_number: u32, items: Vec<CandidateItem>) -> Self {
        write(&self.pages).insert(page_number, PageScript::Items(items));
        self
    }

    /// Script an explicit "no items" answer.
    pub fn with_no_items(self, page_number: u32) -> Self {
        write(&self.pages).insert(page_number, PageScript::NoItems);
        self
    }

    /// Fail the first `times` calls for a page.
    pub fn failing_page(self, page_number: u32, times: u32) -> Self {
        write(&self.failures).insert(page_number, times);
        self
    }

    /// Fail every call for a page.
    pub fn always_failing_page(self, page_number: u32) -> Self {
        self.failing_page(page_number, u32::MAX)
    }

    /// Sleep before answering a page.
    pub fn with_delay(self, page_number: u32, delay: Duration) -> Self {
        write(&self.delays).insert(page_number, delay);
        self
    }

    pub fn calls(&self) -> Vec<MockExtractorCall> {
        read(&self.calls).clone()
    }

    /// Calls made for one page.
    pub fn calls_for(&self, page_number: u32) -> usize {
        read(&self.calls)
            .iter()
            .filter(|c| c.page_number == page_number)
            .count()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, page: &PageImage, instruction: &str) -> Result<PageExtraction> {
        write(&self.calls).push(MockExtractorCall {
            page_number: page.page_number,
            instruction: instruction.to_string(),
        });

        let delay = read(&self.delays).get(&page.page_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = write(&self.failures);
            if let Some(remaining) = failures.get_mut(&page.page_number) {
                if *remaining > 0 {
                    if *remaining != u32::MAX {
                        *remaining -= 1;
                    }
                    return Err(TakeoffError::AI(
                        format!("mock extraction failure on page {}", page.page_number).into(),
                    ));
                }
            }
        }

        Ok(match read(&self.pages).get(&page.page_number) {
            Some(PageScript::Items(items)) => PageExtraction::from_items(items.clone()),
            Some(PageScript::NoItems) | None => PageExtraction::NoItems,
        })
    }
}

/// A small multi-discipline catalog.
pub fn sample_catalog() -> StandardsStore {
    let documents = vec![
        StandardDocument::new(
            "storm-rcp",
            "Reinforced concrete pipe (RCP) for storm drains shall conform to ASTM C76, \
             Class III minimum, with rubber gasket joints.",
            Discipline::Storm,
            Category::Material,
        )
        .with_source("ASTM")
        .with_reference("ASTM C76"),
        StandardDocument::new(
            "storm-slope",
            "Storm drain lines shall be laid at a grade producing a velocity of at least \
             two feet per second when flowing full.",
            Discipline::Storm,
            Category::Slope,
        )
        .with_source("Local Code"),
        StandardDocument::new(
            "sanitary-pvc",
            "PVC gravity sewer pipe shall conform to ASTM D3034, SDR 35, with elastomeric \
             gasket joints per ASTM F477.",
            Discipline::Sanitary,
            Category::Material,
        )
        .with_source("ASTM")
        .with_reference("ASTM D3034"),
        StandardDocument::new(
            "water-dip",
            "Ductile iron pipe (DIP) for water mains shall conform to AWWA C151, pressure \
             class 350, cement-mortar lined.",
            Discipline::Water,
            Category::Material,
        )
        .with_source("AWWA")
        .with_reference("AWWA C151"),
        StandardDocument::new(
            "water-cover",
            "Water mains shall have a minimum cover of 42 inches measured from finished \
             grade to top of pipe.",
            Discipline::Water,
            Category::CoverDepth,
        )
        .with_source("Local Code"),
        StandardDocument::new(
            "general-hdpe",
            "HDPE pipe shall conform to ASTM F2648 and be installed per ASTM D2321 \
             bedding requirements.",
            Discipline::General,
            Category::Material,
        )
        .with_source("ASTM")
        .with_reference("ASTM F2648"),
        StandardDocument::new(
            "general-mh",
            "Manholes (MH) shall be precast concrete sections conforming to ASTM C478 \
             with a 48 inch minimum diameter.",
            Discipline::General,
            Category::Symbol,
        )
        .with_source("ASTM")
        .with_reference("ASTM C478"),
    ];

    match StandardsStore::from_documents(documents) {
        Ok(store) => store,
        Err(e) => unreachable!("sample catalog is valid: {e}"),
    }
}

/// A catalog with a single RCP rule.
pub fn rcp_catalog() -> StandardsStore {
    let documents = vec![StandardDocument::new(
        "storm-rcp",
        "RCP shall conform to ASTM C76.",
        Discipline::Storm,
        Category::Material,
    )
    .with_source("ASTM")
    .with_reference("ASTM C76")];

    match StandardsStore::from_documents(documents) {
        Ok(store) => store,
        Err(e) => unreachable!("rcp catalog is valid: {e}"),
    }
}

/// A blank page image.
pub fn page(page_number: u32) -> PageImage {
    PageImage::new(page_number, vec![0u8; 16]).with_name(format!("C-{page_number:03}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_ai_embed_deterministic() {
        let ai = MockAI::new().with_embedding_dim(128);

        let emb1 = ai.embed("hello").await.unwrap();
        let emb2 = ai.embed("hello").await.unwrap();
        let emb3 = ai.embed("world").await.unwrap();

        assert_eq!(emb1.len(), 128);
        assert_eq!(emb1, emb2); // Same input = same output
        assert_ne!(emb1, emb3); // Different input = different output
        assert_eq!(ai.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_ai_shared_tokens_are_similar() {
        use crate::traits::vector::cosine_similarity;

        let ai = MockAI::new();
        let a = ai.embed("reinforced concrete pipe").await.unwrap();
        let b = ai.embed("concrete pipe").await.unwrap();
        let c = ai.embed("water hydrant").await.unwrap();
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
    }

    #[tokio::test]
    async fn test_mock_ai_scripted_failures() {
        let ai = MockAI::new();
        ai.fail_clustering(true);
        assert!(ai.cluster_items(&[]).await.is_err());
        assert_eq!(ai.cluster_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_extractor_scripts() {
        let extractor = MockExtractor::new()
            .with_page(1, vec![CandidateItem::new(Discipline::Storm, "RCP")])
            .failing_page(2, 1);

        let first = extractor.extract(&page(1), "go").await.unwrap();
        assert_eq!(first.len(), 1);

        assert!(extractor.extract(&page(2), "go").await.is_err());
        assert_eq!(extractor.extract(&page(2), "go").await.unwrap(), PageExtraction::NoItems);
        assert_eq!(extractor.calls_for(2), 2);
    }

    #[test]
    fn test_fixture_catalogs() {
        assert_eq!(sample_catalog().len(), 7);
        assert_eq!(rcp_catalog().len(), 1);
    }
}
