//! Case-level snapshot building

use crate::analysis::{analyze, group_observations};
use crate::normalize::normalize_value;
use crate::{FieldRegistry, ReconcilerConfig};
use chrono::{DateTime, Utc};
use quarry_domain::{CaseId, FieldObservation, FieldSource, InsightSnapshot, ResolvedField};
use std::collections::BTreeSet;

/// Category tag for fields the registry does not know
const UNCATEGORIZED: &str = "other";

/// Highest confidence wins; equal confidence goes to the most recent observation
fn winner<'a>(candidates: &[&'a FieldObservation]) -> Option<&'a FieldObservation> {
    candidates.iter().copied().max_by(|a, b| {
        a.confidence
            .total_cmp(&b.confidence)
            .then(a.observed_at.cmp(&b.observed_at))
    })
}

/// Build the snapshot of a case from all of its observations
///
/// Missing and conflicting fields come from [`analyze`](crate::analyze) unchanged.
pub fn build_snapshot(
    case_id: &CaseId,
    observations: &[FieldObservation],
    registry: &FieldRegistry,
    config: &ReconcilerConfig,
    now: DateTime<Utc>,
) -> InsightSnapshot {
    let analysis = analyze(observations, registry, config);
    let mut snapshot = InsightSnapshot::empty(case_id.clone(), now);

    for (key, candidates) in group_observations(observations, registry) {
        let Some(best) = winner(&candidates) else {
            continue;
        };

        let sources: BTreeSet<FieldSource> = candidates
            .iter()
            .map(|o| FieldSource {
                document_id: o.document_id.clone(),
                category: o.source_document_category.clone(),
            })
            .collect();

        let field_category = registry
            .get(&key)
            .map(|d| d.category.clone())
            .unwrap_or_else(|| UNCATEGORIZED.to_string());

        snapshot
            .by_document_category
            .entry(best.source_document_category.clone())
            .or_default()
            .insert(key.clone(), best.value.clone());
        snapshot
            .by_field_category
            .entry(field_category)
            .or_default()
            .insert(key.clone(), best.value.clone());

        snapshot.fields.insert(
            key.clone(),
            ResolvedField {
                field_key: key,
                value: best.value.clone(),
                normalized: normalize_value(&best.value),
                confidence: best.confidence,
                document_id: best.document_id.clone(),
                document_category: best.source_document_category.clone(),
                observed_at: best.observed_at,
                sources: sources.into_iter().collect(),
            },
        );
    }

    snapshot.missing_fields = analysis.missing_fields;
    snapshot.conflicting_fields = analysis.conflicting_fields;
    snapshot.warnings = analysis.warnings;
    snapshot.observation_count = observations.len();
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use quarry_domain::DocumentId;

    fn t0() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn obs(doc: &str, category: &str, key: &str, value: &str, confidence: f64, offset_secs: i64) -> FieldObservation {
        FieldObservation {
            case_id: CaseId::from("case-1"),
            document_id: DocumentId::from(doc),
            field_key: key.to_string(),
            value: value.to_string(),
            confidence,
            source_document_category: category.to_string(),
            observed_at: t0() + Duration::seconds(offset_secs),
        }
    }

    fn build(observations: &[FieldObservation]) -> InsightSnapshot {
        build_snapshot(
            &CaseId::from("case-1"),
            observations,
            &FieldRegistry::standard(),
            &ReconcilerConfig::default(),
            t0(),
        )
    }

    #[test]
    fn test_highest_confidence_wins() {
        let snapshot = build(&[
            obs("d1", "application", "business_name", "Acme", 0.6, 10),
            obs("d2", "tax_return", "business_name", "Acme LLC", 0.9, 0),
        ]);
        let field = &snapshot.fields["business_name"];
        assert_eq!(field.value, "Acme LLC");
        assert_eq!(field.document_id, DocumentId::from("d2"));
        assert_eq!(field.sources.len(), 2);
    }

    #[test]
    fn test_tie_goes_to_most_recent() {
        let snapshot = build(&[
            obs("d1", "application", "owner_name", "J. Smith", 0.8, 50),
            obs("d2", "application", "owner_name", "Jo Smith", 0.8, 10),
        ]);
        assert_eq!(snapshot.fields["owner_name"].value, "J. Smith");

        let snapshot = build(&[
            obs("d1", "application", "owner_name", "J. Smith", 0.8, 10),
            obs("d2", "application", "owner_name", "Jo Smith", 0.8, 50),
        ]);
        assert_eq!(snapshot.fields["owner_name"].value, "Jo Smith");
    }

    #[test]
    fn test_grouped_views() {
        let snapshot = build(&[
            obs("d1", "application", "business_name", "Acme", 0.9, 0),
            obs("d2", "bank_statement", "ending_balance", "$5,000", 0.9, 0),
            obs("d1", "application", "favorite_color", "red", 0.9, 0),
        ]);

        assert_eq!(snapshot.by_document_category["application"]["business_name"], "Acme");
        assert_eq!(snapshot.by_document_category["bank_statement"]["ending_balance"], "$5,000");
        assert_eq!(snapshot.by_field_category["business"]["business_name"], "Acme");
        assert_eq!(snapshot.by_field_category["banking"]["ending_balance"], "$5,000");
        assert_eq!(snapshot.by_field_category[UNCATEGORIZED]["favorite_color"], "red");
        assert_eq!(snapshot.observation_count, 3);
    }

    #[test]
    fn test_reuses_analysis() {
        let observations = vec![
            obs("d1", "application", "business_name", "Acme", 0.9, 0),
            obs("d2", "application", "total_revenue", "1000", 0.9, 0),
            obs("d3", "application", "total_revenue", "1300", 0.9, 0),
        ];
        let snapshot = build(&observations);
        let analysis = analyze(&observations, &FieldRegistry::standard(), &ReconcilerConfig::default());
        assert_eq!(snapshot.analysis(), analysis);
    }

    #[test]
    fn test_sources_deduplicated() {
        let snapshot = build(&[
            obs("d1", "application", "tax_id", "12-3456789", 0.5, 0),
            obs("d1", "application", "ein", "12-3456789", 0.7, 0),
        ]);
        let field = &snapshot.fields["tax_id"];
        assert_eq!(field.sources.len(), 1);
        assert_eq!(field.normalized, "12-3456789");
        assert_eq!(field.confidence, 0.7);
    }

    #[test]
    fn test_empty_case() {
        let snapshot = build(&[]);
        assert!(snapshot.fields.is_empty());
        assert_eq!(snapshot.missing_fields.len(), 3);
        assert_eq!(snapshot.computed_at, t0());
    }
}
