//! Extraction module - parse AI responses into candidate items.

use serde::Deserialize;
use tracing::warn;

use super::dedup::strip_code_fence;
use crate::types::{item::CandidateItem, page::PageExtraction};

/// Extraction response from AI (before item validation).
#[derive(Debug, Clone, Deserialize)]
pub struct AIExtractionResponse {
    #[serde(default, alias = "detections")]
    pub items: Vec<serde_json::Value>,
}

/// Parse an extraction response.
///
/// Accepts `{"items": [...]}` or a bare array, optionally fenced in
/// markdown. Items that do not fit the candidate shape (missing material,
/// unknown discipline) are dropped with a warning; they are never patched
/// up with guessed values. Blank materials are dropped too.
pub fn parse_extraction_response(text: &str) -> Result<PageExtraction, serde_json::Error> {
    let json = strip_code_fence(text);

    let raw = match serde_json::from_str::<Vec<serde_json::Value>>(json) {
        Ok(items) => items,
        Err(_) => serde_json::from_str::<AIExtractionResponse>(json)?.items,
    };

    let items = raw
        .into_iter()
        .enumerate()
        .filter_map(|(i, value)| match serde_json::from_value::<CandidateItem>(value) {
            Ok(item) if !item.material.trim().is_empty() => Some(item),
            Ok(_) => {
                warn!(index = i, "Dropping extracted item without material");
                None
            }
            Err(e) => {
                warn!(index = i, error = %e, "Dropping malformed extracted item");
                None
            }
        })
        .collect();

    Ok(PageExtraction::from_items(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{item::SourceView, standard::Discipline};

    #[test]
    fn test_parse_object_with_items() {
        let text = r#"```json
{"items": [
  {"discipline": "storm", "material": "RCP", "diameter_in": 15, "length_ft": 120.5,
   "source_view": "profile", "station_start": "1+00", "station_end": "2+20"},
  {"discipline": "water", "material": "DIP", "rim_elevation": 655.0}
]}
```"#;
        let items = parse_extraction_response(text).unwrap().into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].discipline, Discipline::Storm);
        assert_eq!(items[0].source_view, SourceView::Profile);
        assert_eq!(items[0].length_ft, Some(120.5));
        assert_eq!(items[1].rim_elevation_ft, Some(655.0));
    }

    #[test]
    fn test_empty_list_is_no_items() {
        assert_eq!(parse_extraction_response("[]").unwrap(), PageExtraction::NoItems);
        assert_eq!(
            parse_extraction_response(r#"{"items": []}"#).unwrap(),
            PageExtraction::NoItems
        );
    }

    #[test]
    fn test_malformed_items_are_dropped() {
        let text = r#"[
            {"discipline": "gas", "material": "PE"},
            {"discipline": "sanitary"},
            {"discipline": "sanitary", "material": "  "},
            {"discipline": "sanitary", "material": "PVC", "diameter_in": 8}
        ]"#;
        let items = parse_extraction_response(text).unwrap().into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].material, "PVC");
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_extraction_response("the sheet shows pipes").is_err());
    }
}
