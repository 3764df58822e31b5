//! Report assembly: canonical items, validations, alerts and warnings.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::types::{
    item::{CandidateItem, CanonicalItem},
    report::{Alert, ReportSummary, RunReport, RunWarning, Severity},
    standard::Discipline,
    validation::{MaterialStatus, MaterialValidation},
};

/// Disciplines each material key was drawn in.
fn disciplines_by_material(candidates: &[CandidateItem]) -> BTreeMap<String, BTreeSet<Discipline>> {
    let mut map: BTreeMap<String, BTreeSet<Discipline>> = BTreeMap::new();
    for item in candidates {
        map.entry(item.material_key())
            .or_default()
            .insert(item.discipline);
    }
    map
}

/// Alerts for the validations and warnings of one run.
///
/// Every unresolved material yields exactly one alert; it is critical when
/// any candidate with that material is in a critical discipline.
pub fn build_alerts<'a>(
    candidates: &[CandidateItem],
    validations: impl IntoIterator<Item = &'a MaterialValidation>,
    warnings: &[RunWarning],
    critical: &[Discipline],
) -> Vec<Alert> {
    let disciplines = disciplines_by_material(candidates);
    let mut alerts = Vec::new();

    for warning in warnings {
        match warning {
            RunWarning::PartialExtractionFailure { pages, .. } => alerts.push(Alert::new(
                Severity::Warning,
                None,
                format!("Extraction failed for page(s) {pages:?}; quantities may be incomplete"),
            )),
            RunWarning::BlankMaterialDropped { pages, count } => alerts.push(Alert::new(
                Severity::Warning,
                None,
                format!(
                    "{count} item(s) on page(s) {pages:?} had no material and were left out; \
                     quantities may be incomplete"
                ),
            )),
            _ => {}
        }
    }

    for validation in validations.into_iter().filter(|v| v.status.needs_review()) {
        let material = &validation.material;
        match validation.status {
            MaterialStatus::Unresolved => {
                let seen_in = disciplines.get(material);
                let is_critical = seen_in
                    .is_some_and(|set| set.iter().any(|d| critical.contains(d)));
                let severity = if is_critical {
                    Severity::Critical
                } else {
                    Severity::Warning
                };
                let where_seen = seen_in
                    .map(|set| set.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(", "))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| "unknown".to_string());
                alerts.push(Alert::new(
                    severity,
                    Some(material.clone()),
                    format!(
                        "Material {material} ({where_seen}) is not in the standards catalog and \
                         no external source confirms it"
                    ),
                ));
            }
            MaterialStatus::UnresolvedButFound => {
                let sources = validation.external_sources.join(", ");
                alerts.push(Alert::new(
                    Severity::Info,
                    Some(material.clone()),
                    format!(
                        "Material {material} is not in the standards catalog; external sources \
                         mention it ({sources}), review before use"
                    ),
                ));
            }
            MaterialStatus::Known | MaterialStatus::KnownThinEvidence => {}
        }
    }

    alerts
}

/// Assemble the final report.
pub fn assemble_report(
    candidates: &[CandidateItem],
    validations: &BTreeMap<String, MaterialValidation>,
    canonical: Vec<CanonicalItem>,
    warnings: Vec<RunWarning>,
    critical: &[Discipline],
) -> RunReport {
    let alerts = build_alerts(candidates, validations.values(), &warnings, critical);
    let summary = ReportSummary::from_items(&canonical);

    let report = RunReport {
        run_id: Uuid::now_v7(),
        generated_at: Utc::now(),
        summary,
        items: canonical,
        materials: validations.values().cloned().collect(),
        alerts,
        warnings,
    };

    info!(
        run_id = %report.run_id,
        items = report.summary.total,
        materials = report.materials.len(),
        alerts = report.alerts.len(),
        warnings = report.warnings.len(),
        "Report assembled"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validations(entries: &[(&str, MaterialStatus)]) -> BTreeMap<String, MaterialValidation> {
        entries
            .iter()
            .map(|(m, s)| (m.to_string(), MaterialValidation::new(*m, *s)))
            .collect()
    }

    #[test]
    fn test_unresolved_in_water_is_critical() {
        let candidates = vec![
            CandidateItem::new(Discipline::Storm, "FPVC"),
            CandidateItem::new(Discipline::Water, "fpvc"),
            CandidateItem::new(Discipline::Storm, "XYZ"),
        ];
        let validations = validations(&[
            ("FPVC", MaterialStatus::Unresolved),
            ("XYZ", MaterialStatus::Unresolved),
        ]);

        let alerts = build_alerts(&candidates, validations.values(), &[], &[Discipline::Water]);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].material.as_deref(), Some("FPVC"));
        assert_eq!(alerts[0].severity, Severity::Critical);
        assert_eq!(alerts[1].severity, Severity::Warning);
    }

    #[test]
    fn test_found_is_info_and_known_is_silent() {
        let validations = validations(&[
            ("HDPE", MaterialStatus::UnresolvedButFound),
            ("RCP", MaterialStatus::Known),
            ("PVC", MaterialStatus::KnownThinEvidence),
        ]);
        let alerts = build_alerts(&[], validations.values(), &[], &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Info);
        assert_eq!(alerts[0].material.as_deref(), Some("HDPE"));
    }

    #[test]
    fn test_partial_extraction_alert_has_no_material() {
        let warnings = vec![
            RunWarning::PartialExtractionFailure {
                pages: vec![3],
                errors: vec!["timed out".into()],
            },
            RunWarning::RetrievalEmpty {
                material: "RCP".into(),
            },
        ];
        let alerts = build_alerts(&[], std::iter::empty(), &warnings, &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert!(alerts[0].material.is_none());
        assert!(alerts[0].message.contains("[3]"));
    }

    #[test]
    fn test_blank_material_drop_raises_run_level_alert() {
        let warnings = vec![RunWarning::BlankMaterialDropped {
            pages: vec![1, 4],
            count: 3,
        }];
        let alerts = build_alerts(&[], std::iter::empty(), &warnings, &[]);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Warning);
        assert!(alerts[0].material.is_none());
        assert!(alerts[0].message.starts_with("3 item(s) on page(s) [1, 4]"));
    }

    #[test]
    fn test_report_materials_sorted_and_searchable() {
        let validations = validations(&[
            ("RCP", MaterialStatus::Known),
            ("DIP", MaterialStatus::Known),
            ("FPVC", MaterialStatus::Unresolved),
        ]);
        let canonical = vec![CanonicalItem::singleton(
            0,
            CandidateItem::new(Discipline::Storm, "RCP").with_length(50.0),
        )];

        let report = assemble_report(&[], &validations, canonical, Vec::new(), &[]);
        let keys: Vec<_> = report.materials.iter().map(|m| m.material.as_str()).collect();
        assert_eq!(keys, vec!["DIP", "FPVC", "RCP"]);
        assert!(report.material("FPVC").is_some());
        assert_eq!(report.alerts_for("FPVC").count(), 1);
        assert_eq!(report.summary.total, 1);
        assert_eq!(report.max_severity(), Some(Severity::Warning));
    }
}
