//! Standards catalog - the fixed knowledge base retrieval runs over.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::types::standard::{Category, Discipline, StandardDocument, StandardFilter};

/// File holding the abbreviation table inside a catalog directory.
pub const ABBREVIATIONS_FILE: &str = "abbreviations.json";

/// Rule texts outside this word range load with a warning.
const EXPECTED_WORDS: std::ops::RangeInclusive<usize> = 50..=200;

/// Common construction abbreviations and what they stand for.
pub fn default_abbreviations() -> IndexMap<String, String> {
    [
        ("MH", "manhole"),
        ("SSMH", "sanitary sewer manhole"),
        ("CB", "catch basin"),
        ("DI", "drain inlet"),
        ("WM", "water main"),
        ("HYD", "hydrant"),
        ("RCP", "reinforced concrete pipe"),
        ("PVC", "polyvinyl chloride pipe"),
        ("HDPE", "high density polyethylene"),
        ("IE", "invert elevation"),
        ("INV", "invert elevation"),
        ("SS", "sanitary sewer"),
        ("SD", "storm drain"),
        ("DIP", "ductile iron pipe"),
        ("VCP", "vitrified clay pipe"),
        ("CMP", "corrugated metal pipe"),
        ("FES", "flared end section"),
        ("GV", "gate valve"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Catalog entry as written on disk.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "content")]
    text: String,
    discipline: Discipline,
    category: Category,
    #[serde(default)]
    source: String,
    #[serde(default)]
    reference: String,
}

/// Document counts by metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total: usize,
    pub by_discipline: BTreeMap<Discipline, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub abbreviations: usize,
}

/// Read-only catalog of standard documents plus the abbreviation table.
///
/// Built once, then shared as `Arc<StandardsStore>` by every component.
#[derive(Debug, Clone)]
pub struct StandardsStore {
    documents: Vec<Arc<StandardDocument>>,
    by_id: IndexMap<String, usize>,
    abbreviations: IndexMap<String, String>,
}

impl StandardsStore {
    /// Build a store from documents, with the default abbreviation table.
    pub fn from_documents(documents: Vec<StandardDocument>) -> CatalogResult<Self> {
        let mut by_id = IndexMap::with_capacity(documents.len());
        let mut shared = Vec::with_capacity(documents.len());

        for doc in documents {
            if doc.text.trim().is_empty() {
                return Err(CatalogError::EmptyText(doc.id));
            }
            if by_id.contains_key(&doc.id) {
                return Err(CatalogError::DuplicateId(doc.id));
            }
            let words = doc.word_count();
            if !EXPECTED_WORDS.contains(&words) {
                warn!(id = %doc.id, words, "Standard text outside the expected length");
            }
            by_id.insert(doc.id.clone(), shared.len());
            shared.push(Arc::new(doc));
        }

        Ok(Self {
            documents: shared,
            by_id,
            abbreviations: default_abbreviations(),
        })
    }

    /// Load every `*.json` file in a directory.
    ///
    /// Each file is an array of rules. Ids default to `<file-stem>-<n>`.
    /// An `abbreviations.json` object replaces the default table.
    pub fn from_dir(dir: impl AsRef<Path>) -> CatalogResult<Self> {
        let dir = dir.as_ref();
        let read_dir = fs::read_dir(dir).map_err(|source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        // Directory order is platform-dependent
        files.sort();

        let mut documents = Vec::new();
        let mut abbreviations = None;

        for path in files {
            let contents = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;

            if path.file_name().is_some_and(|name| name == ABBREVIATIONS_FILE) {
                let table: IndexMap<String, String> =
                    serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                abbreviations = Some(table);
                continue;
            }

            let raw: Vec<RawDocument> =
                serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                    path: path.clone(),
                    source,
                })?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            debug!(file = %path.display(), count = raw.len(), "Loaded catalog file");

            for (n, doc) in raw.into_iter().enumerate() {
                documents.push(StandardDocument {
                    id: doc.id.unwrap_or_else(|| format!("{stem}-{}", n + 1)),
                    text: doc.text,
                    discipline: doc.discipline,
                    category: doc.category,
                    source: doc.source,
                    reference: doc.reference,
                });
            }
        }

        let mut store = Self::from_documents(documents)?;
        if let Some(table) = abbreviations {
            store = store.with_abbreviations(table);
        }

        info!(
            dir = %dir.display(),
            documents = store.len(),
            abbreviations = store.abbreviations.len(),
            "Standards catalog loaded"
        );
        Ok(store)
    }

    /// Replace the abbreviation table. Keys are normalized to upper-case.
    pub fn with_abbreviations(mut self, table: IndexMap<String, String>) -> Self {
        self.abbreviations = table
            .into_iter()
            .map(|(k, v)| (k.trim().to_uppercase(), v))
            .collect();
        self
    }

    /// All documents in load order.
    pub fn documents(&self) -> &[Arc<StandardDocument>] {
        &self.documents
    }

    pub fn get(&self, id: &str) -> Option<&Arc<StandardDocument>> {
        self.by_id.get(id).map(|&i| &self.documents[i])
    }

    /// Position of a document in load order.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents matching a filter, in load order.
    pub fn filter<'a>(
        &'a self,
        filter: &'a StandardFilter,
    ) -> impl Iterator<Item = &'a Arc<StandardDocument>> + 'a {
        self.documents.iter().filter(move |d| filter.matches_document(d))
    }

    pub fn abbreviations(&self) -> &IndexMap<String, String> {
        &self.abbreviations
    }

    /// Expansion of an abbreviation (case-insensitive lookup).
    pub fn expand_abbreviation(&self, term: &str) -> Option<&str> {
        self.abbreviations
            .get(&term.trim().to_uppercase())
            .map(String::as_str)
    }

    /// Disciplines present in the catalog, sorted.
    pub fn disciplines(&self) -> Vec<Discipline> {
        let set: HashSet<_> = self.documents.iter().map(|d| d.discipline).collect();
        let mut list: Vec<_> = set.into_iter().collect();
        list.sort();
        list
    }

    /// Categories present in the catalog, sorted.
    pub fn categories(&self) -> Vec<Category> {
        let set: HashSet<_> = self.documents.iter().map(|d| d.category).collect();
        let mut list: Vec<_> = set.into_iter().collect();
        list.sort();
        list
    }

    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            total: self.documents.len(),
            abbreviations: self.abbreviations.len(),
            ..Default::default()
        };
        for doc in &self.documents {
            *stats.by_discipline.entry(doc.discipline).or_insert(0) += 1;
            *stats.by_category.entry(doc.category).or_insert(0) += 1;
        }
        stats
    }
}
