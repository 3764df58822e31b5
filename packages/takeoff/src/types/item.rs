//! Candidate items produced by extraction and the canonical items that
//! survive deduplication.

use serde::{Deserialize, Serialize};

use super::standard::Discipline;

/// Which drawing view an item was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceView {
    #[default]
    Plan,
    Profile,
}

/// Broad kind of takeoff item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Mainline,
    Lateral,
    Structure,
    Fitting,
}

/// One detection reported by the extraction collaborator for one page/view.
///
/// The same physical pipe may appear several times (plan and profile,
/// adjacent sheets); deduplication decides which detections belong together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateItem {
    pub discipline: Discipline,

    /// Free-text material token ("PVC", "RCP", "DIP"); compared case-insensitively
    pub material: String,

    #[serde(default)]
    pub diameter_in: Option<f64>,

    #[serde(default)]
    pub length_ft: Option<f64>,

    #[serde(default)]
    pub depth_ft: Option<f64>,

    #[serde(default)]
    pub invert_in_ft: Option<f64>,

    #[serde(default)]
    pub invert_out_ft: Option<f64>,

    #[serde(default, alias = "rim_elevation")]
    pub rim_elevation_ft: Option<f64>,

    /// 1-based page number; the orchestrator stamps this from the page input
    #[serde(default)]
    pub source_page: u32,

    #[serde(default)]
    pub source_view: SourceView,

    /// Label text the extractor attached, e.g. `8" PVC` or `MH-1`
    #[serde(default)]
    pub raw_label: String,

    #[serde(default)]
    pub item_type: Option<ItemType>,

    #[serde(default)]
    pub structure_name: Option<String>,

    #[serde(default)]
    pub from_structure: Option<String>,

    #[serde(default)]
    pub to_structure: Option<String>,

    #[serde(default)]
    pub station_start: Option<String>,

    #[serde(default)]
    pub station_end: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl CandidateItem {
    /// Create an item with the required fields; everything optional is empty.
    pub fn new(discipline: Discipline, material: impl Into<String>) -> Self {
        Self {
            discipline,
            material: material.into(),
            diameter_in: None,
            length_ft: None,
            depth_ft: None,
            invert_in_ft: None,
            invert_out_ft: None,
            rim_elevation_ft: None,
            source_page: 0,
            source_view: SourceView::Plan,
            raw_label: String::new(),
            item_type: None,
            structure_name: None,
            from_structure: None,
            to_structure: None,
            station_start: None,
            station_end: None,
            notes: None,
        }
    }

    pub fn with_diameter(mut self, inches: f64) -> Self {
        self.diameter_in = Some(inches);
        self
    }

    pub fn with_length(mut self, feet: f64) -> Self {
        self.length_ft = Some(feet);
        self
    }

    pub fn with_depth(mut self, feet: f64) -> Self {
        self.depth_ft = Some(feet);
        self
    }

    pub fn with_inverts(mut self, invert_in: f64, invert_out: f64) -> Self {
        self.invert_in_ft = Some(invert_in);
        self.invert_out_ft = Some(invert_out);
        self
    }

    pub fn with_rim_elevation(mut self, feet: f64) -> Self {
        self.rim_elevation_ft = Some(feet);
        self
    }

    pub fn with_stations(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.station_start = Some(start.into());
        self.station_end = Some(end.into());
        self
    }

    pub fn on_page(mut self, page: u32, view: SourceView) -> Self {
        self.source_page = page;
        self.source_view = view;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.raw_label = label.into();
        self
    }

    pub fn with_item_type(mut self, item_type: ItemType) -> Self {
        self.item_type = Some(item_type);
        self
    }

    /// Normalized material key used to group validations (trimmed, upper-case).
    pub fn material_key(&self) -> String {
        material_key(&self.material)
    }

    /// Count of populated optional detail fields.
    ///
    /// Used to pick the most informative detection of a cluster.
    pub fn detail_score(&self) -> usize {
        let numbers = [
            self.depth_ft,
            self.invert_in_ft,
            self.invert_out_ft,
            self.rim_elevation_ft,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count();

        let texts = [
            &self.structure_name,
            &self.from_structure,
            &self.to_structure,
            &self.station_start,
            &self.station_end,
        ]
        .iter()
        .filter(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
        .count();

        numbers + texts
    }

    /// Whether two items agree on discipline, material and diameter.
    ///
    /// Necessary (not sufficient) for them to describe the same object.
    pub fn structurally_matches(&self, other: &CandidateItem) -> bool {
        self.discipline == other.discipline
            && self.material_key() == other.material_key()
            && diameters_match(self.diameter_in, other.diameter_in)
    }
}

fn diameters_match(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < 1e-6,
        (None, None) => true,
        _ => false,
    }
}

/// Normalize a free-text material into its grouping key.
pub fn material_key(material: &str) -> String {
    material.trim().to_uppercase()
}

/// The representative of one cluster of duplicate detections.
///
/// Quantities come from the representative alone; multiple views of one
/// pipe never multiply its length or count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    #[serde(flatten)]
    pub item: CandidateItem,

    /// How many raw detections this item absorbed
    pub member_count: usize,

    /// Pages the absorbed detections came from (sorted, distinct)
    pub member_source_pages: Vec<u32>,

    /// Indices into the run's candidate list
    pub member_indices: Vec<usize>,
}

impl CanonicalItem {
    /// A cluster of one.
    pub fn singleton(index: usize, item: CandidateItem) -> Self {
        Self {
            member_source_pages: vec![item.source_page],
            item,
            member_count: 1,
            member_indices: vec![index],
        }
    }

    /// Whether this item absorbed more than one detection.
    pub fn is_merged(&self) -> bool {
        self.member_count > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_score_counts_populated_fields() {
        let bare = CandidateItem::new(Discipline::Storm, "RCP").with_diameter(15.0);
        assert_eq!(bare.detail_score(), 0);

        let rich = bare
            .clone()
            .with_inverts(645.5, 644.0)
            .with_stations("1+00", "2+50");
        assert_eq!(rich.detail_score(), 4);
    }

    #[test]
    fn test_blank_strings_do_not_count_as_detail() {
        let mut item = CandidateItem::new(Discipline::Water, "DIP");
        item.structure_name = Some("  ".to_string());
        assert_eq!(item.detail_score(), 0);
    }

    #[test]
    fn test_structural_match_is_case_insensitive_on_material() {
        let a = CandidateItem::new(Discipline::Sanitary, "pvc").with_diameter(8.0);
        let b = CandidateItem::new(Discipline::Sanitary, " PVC ").with_diameter(8.0);
        let c = CandidateItem::new(Discipline::Sanitary, "PVC").with_diameter(10.0);
        assert!(a.structurally_matches(&b));
        assert!(!a.structurally_matches(&c));
    }

    #[test]
    fn test_item_type_round_trips_lowercase() {
        let item = CandidateItem::new(Discipline::Sanitary, "PVC").with_item_type(ItemType::Lateral);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["item_type"], "lateral");

        let back: CandidateItem = serde_json::from_value(json).unwrap();
        assert_eq!(back.item_type, Some(ItemType::Lateral));
        assert_eq!(back.detail_score(), 0);
    }

    #[test]
    fn test_deserialize_minimal_item() {
        let json = r#"{"discipline": "storm", "material": "RCP", "diameter_in": 15, "length_ft": 100}"#;
        let item: CandidateItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.discipline, Discipline::Storm);
        assert_eq!(item.diameter_in, Some(15.0));
        assert_eq!(item.source_view, SourceView::Plan);
        assert!(item.invert_in_ft.is_none());
    }
}
