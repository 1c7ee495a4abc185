//! Structured provider output to field observations

use crate::{FieldRegistry, ReconcilerConfig};
use chrono::{DateTime, Utc};
use quarry_domain::{DocumentVersion, FieldObservation};
use serde_json::{Map, Value};
use tracing::debug;

/// Nesting accepted for section objects like `{"business": {"ein": ...}}`
const MAX_DEPTH: usize = 2;

fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn collect(
    fields: &Map<String, Value>,
    depth: usize,
    document: &DocumentVersion,
    registry: &FieldRegistry,
    config: &ReconcilerConfig,
    now: DateTime<Utc>,
    out: &mut Vec<FieldObservation>,
) {
    for (name, raw) in fields {
        // `{"value": ..., "confidence": ...}` carries its own confidence
        let (value, confidence) = match raw {
            Value::Object(inner) if inner.contains_key("value") => {
                let confidence = inner
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .filter(|c| c.is_finite())
                    .map(|c| c.clamp(0.0, 1.0))
                    .unwrap_or(config.default_confidence);
                (inner.get("value").and_then(scalar_text), confidence)
            }
            Value::Object(section) => {
                if depth < MAX_DEPTH {
                    collect(section, depth + 1, document, registry, config, now, out);
                }
                continue;
            }
            other => (scalar_text(other), config.default_confidence),
        };

        let Some(value) = value else {
            continue;
        };
        let Some(definition) = registry.resolve(name) else {
            debug!(document_id = %document.document_id, key = %name, "Ignoring unknown field");
            continue;
        };
        if !definition.applies_to.includes(&document.category) {
            debug!(
                document_id = %document.document_id,
                field = %definition.field_key,
                category = %document.category,
                "Field does not apply to document category"
            );
            continue;
        }

        out.push(FieldObservation {
            case_id: document.case_id.clone(),
            document_id: document.document_id.clone(),
            field_key: definition.field_key.clone(),
            value,
            confidence,
            source_document_category: document.category.clone(),
            observed_at: now,
        });
    }
}

/// Turn a provider's structured output into observations for `document`
///
/// Keys are resolved through the registry (aliases, any spelling); unknown keys
/// and fields that do not apply to the document's category are dropped. Values
/// may be plain scalars or `{"value": ..., "confidence": ...}` objects; one level
/// of section nesting is flattened. Anything but an object yields nothing.
pub fn observations_from_structured(
    structured: &Value,
    document: &DocumentVersion,
    registry: &FieldRegistry,
    config: &ReconcilerConfig,
    now: DateTime<Utc>,
) -> Vec<FieldObservation> {
    let mut observations = Vec::new();
    if let Value::Object(fields) = structured {
        collect(fields, 1, document, registry, config, now, &mut observations);
    }
    observations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use quarry_domain::{CaseId, DocumentId};
    use serde_json::json;

    fn document(category: &str) -> DocumentVersion {
        DocumentVersion {
            document_id: DocumentId::from("doc-1"),
            case_id: CaseId::from("case-1"),
            version: 1,
            content_ref: "doc-1.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            file_name: "doc-1.txt".to_string(),
            category: category.to_string(),
        }
    }

    fn ingest(structured: Value, category: &str) -> Vec<FieldObservation> {
        observations_from_structured(
            &structured,
            &document(category),
            &FieldRegistry::standard(),
            &ReconcilerConfig::default(),
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        )
    }

    fn keys(observations: &[FieldObservation]) -> Vec<&str> {
        let mut keys: Vec<&str> = observations.iter().map(|o| o.field_key.as_str()).collect();
        keys.sort_unstable();
        keys
    }

    #[test]
    fn test_aliases_resolve_to_canonical_keys() {
        let observations = ingest(
            json!({"EIN": "12-3456789", "Legal Name": "Acme LLC", "gross_revenue": 250000}),
            "application",
        );
        assert_eq!(keys(&observations), vec!["business_name", "tax_id", "total_revenue"]);
        let revenue = observations.iter().find(|o| o.field_key == "total_revenue").unwrap();
        assert_eq!(revenue.value, "250000");
        assert_eq!(revenue.confidence, 0.5);
        assert_eq!(revenue.case_id, CaseId::from("case-1"));
        assert_eq!(revenue.source_document_category, "application");
    }

    #[test]
    fn test_applies_to_filters_by_category() {
        let structured = json!({"ending_balance": "$1,000", "business_name": "Acme"});
        assert_eq!(keys(&ingest(structured.clone(), "application")), vec!["business_name"]);
        assert_eq!(
            keys(&ingest(structured, "bank_statement")),
            vec!["business_name", "ending_balance"]
        );
    }

    #[test]
    fn test_value_objects_carry_confidence() {
        let observations = ingest(
            json!({
                "tax_id": {"value": "12-3456789", "confidence": 0.97},
                "owner_name": {"value": "Jo Smith", "confidence": 7},
                "business_name": {"value": "Acme"}
            }),
            "application",
        );
        let confidence = |key: &str| observations.iter().find(|o| o.field_key == key).unwrap().confidence;
        assert_eq!(confidence("tax_id"), 0.97);
        assert_eq!(confidence("owner_name"), 1.0);
        assert_eq!(confidence("business_name"), 0.5);
    }

    #[test]
    fn test_sections_are_flattened() {
        let observations = ingest(
            json!({"business": {"name": "ignored", "ein": "12-3456789"}, "owner": {"owner_name": "Jo"}}),
            "application",
        );
        assert_eq!(keys(&observations), vec!["owner_name", "tax_id"]);
    }

    #[test]
    fn test_unknown_keys_are_not_observed() {
        let observations = ingest(
            json!({"business_name": "Acme", "favorite_color": "red", "Fleet Size": 12}),
            "application",
        );
        assert_eq!(keys(&observations), vec!["business_name"]);
    }

    #[test]
    fn test_skips_unusable_values() {
        let observations = ingest(
            json!({"tax_id": null, "business_name": "  ", "owner_name": ["a", "b"], "color": "red"}),
            "application",
        );
        assert!(observations.is_empty());
        assert!(ingest(json!(["tax_id"]), "application").is_empty());
    }
}
