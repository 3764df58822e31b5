//! Standards catalog types.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Utility discipline a rule or a detected item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    Storm,
    Sanitary,
    Water,
    /// Rules that apply to every discipline.
    General,
}

impl Discipline {
    /// All disciplines, in report order.
    pub const ALL: [Discipline; 4] = [
        Discipline::Storm,
        Discipline::Sanitary,
        Discipline::Water,
        Discipline::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Storm => "storm",
            Self::Sanitary => "sanitary",
            Self::Water => "water",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "storm" | "sd" | "stm" => Ok(Self::Storm),
            "sanitary" | "ss" | "sewer" => Ok(Self::Sanitary),
            "water" | "wm" => Ok(Self::Water),
            "general" => Ok(Self::General),
            other => Err(format!("unknown discipline: {other}")),
        }
    }
}

/// What kind of rule a standard document states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    #[serde(alias = "cover_depth")]
    CoverDepth,
    Material,
    Symbol,
    Slope,
    Validation,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoverDepth => "cover-depth",
            Self::Material => "material",
            Self::Symbol => "symbol",
            Self::Slope => "slope",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "cover-depth" => Ok(Self::CoverDepth),
            "material" => Ok(Self::Material),
            "symbol" => Ok(Self::Symbol),
            "slope" => Ok(Self::Slope),
            "validation" => Ok(Self::Validation),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

/// A single short, self-contained domain rule.
///
/// Created once when the catalog loads and shared as `Arc<StandardDocument>`
/// by every retrieval call afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardDocument {
    pub id: String,

    /// The rule text (typically 50-200 words)
    pub text: String,

    pub discipline: Discipline,

    pub category: Category,

    /// Issuing body or code (e.g. "ASTM", "AWWA", "Local Code")
    pub source: String,

    /// Specific section (e.g. "ASTM C76")
    #[serde(default)]
    pub reference: String,
}

impl StandardDocument {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        discipline: Discipline,
        category: Category,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            discipline,
            category,
            source: String::new(),
            reference: String::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    /// Number of whitespace-separated words in the rule text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Optional metadata filter for retrieval.
///
/// A discipline filter also admits `general` rules, since those apply to
/// every discipline. A category filter is exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardFilter {
    pub discipline: Option<Discipline>,
    pub category: Option<Category>,
}

impl StandardFilter {
    /// Create an empty filter (matches all).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_discipline(discipline: Discipline) -> Self {
        Self {
            discipline: Some(discipline),
            category: None,
        }
    }

    pub fn for_category(category: Category) -> Self {
        Self {
            discipline: None,
            category: Some(category),
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Check a document's metadata against the filter.
    pub fn matches(&self, discipline: Discipline, category: Category) -> bool {
        let discipline_ok = match self.discipline {
            Some(wanted) => discipline == wanted || discipline == Discipline::General,
            None => true,
        };
        let category_ok = self.category.map_or(true, |wanted| category == wanted);
        discipline_ok && category_ok
    }

    pub fn matches_document(&self, doc: &StandardDocument) -> bool {
        self.matches(doc.discipline, doc.category)
    }
}

/// One ranked result of a retrieval call.
///
/// Ranks are 1-based; `None` means the method did not return the document.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub document: Arc<StandardDocument>,
    pub lexical_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
    pub fused_score: f64,
    /// How many query variants surfaced this document (1 for plain retrieval)
    pub variant_hits: usize,
}

impl RetrievalHit {
    pub fn document_id(&self) -> &str {
        &self.document.id
    }

    pub fn text(&self) -> &str {
        &self.document.text
    }
}
