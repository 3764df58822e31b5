//! Page types - drawing pages handed to the extractor and what comes back.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::item::CandidateItem;

/// One rendered drawing page.
///
/// Rendering the PDF happens upstream; the core only sees image bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-based page number within the drawing set
    pub page_number: u32,

    /// Sheet name or file name, for logs and prompts
    pub name: String,

    /// MIME type of `bytes` (e.g. "image/png")
    pub media_type: String,

    #[serde(skip)]
    pub bytes: Vec<u8>,

    /// SHA-256 hash of the image bytes
    pub content_hash: String,
}

impl PageImage {
    pub fn new(page_number: u32, bytes: Vec<u8>) -> Self {
        let content_hash = Self::hash_content(&bytes);
        Self {
            page_number,
            name: format!("page-{page_number}"),
            media_type: "image/png".to_string(),
            bytes,
            content_hash,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    /// Compute SHA-256 hash of image bytes.
    pub fn hash_content(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Guess the media type from a file extension, defaulting to PNG.
    pub fn media_type_for_extension(ext: &str) -> &'static str {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "webp" => "image/webp",
            "gif" => "image/gif",
            _ => "image/png",
        }
    }
}

/// What the extractor reported for one page.
///
/// `NoItems` is an explicit answer ("this sheet has no utilities"),
/// distinct from a failed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum PageExtraction {
    Items(Vec<CandidateItem>),
    NoItems,
}

impl PageExtraction {
    /// Build from a raw list; an empty list means the page has no items.
    pub fn from_items(items: Vec<CandidateItem>) -> Self {
        if items.is_empty() {
            Self::NoItems
        } else {
            Self::Items(items)
        }
    }

    pub fn into_items(self) -> Vec<CandidateItem> {
        match self {
            Self::Items(items) => items,
            Self::NoItems => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::NoItems => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::standard::Discipline;

    #[test]
    fn test_page_hash_is_stable() {
        let a = PageImage::new(1, vec![1, 2, 3]);
        let b = PageImage::new(2, vec![1, 2, 3]);
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.name, "page-1");
    }

    #[test]
    fn test_empty_list_is_no_items() {
        assert_eq!(PageExtraction::from_items(vec![]), PageExtraction::NoItems);
        let one = PageExtraction::from_items(vec![CandidateItem::new(Discipline::Storm, "RCP")]);
        assert_eq!(one.len(), 1);
        assert!(PageExtraction::NoItems.into_items().is_empty());
    }

    #[test]
    fn test_media_type_for_extension() {
        assert_eq!(PageImage::media_type_for_extension("JPG"), "image/jpeg");
        assert_eq!(PageImage::media_type_for_extension("tiff"), "image/png");
    }
}
