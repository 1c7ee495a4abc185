//! Missing and conflicting field detection

use crate::normalize::{count_clusters, normalize_value, parse_numeric};
use crate::{FieldRegistry, ReconcilerConfig};
use quarry_domain::{FieldAnalysis, FieldObservation};
use std::collections::{BTreeMap, BTreeSet};

/// Observations with a non-empty normalized value, grouped by canonical key
///
/// Keys the registry knows are folded onto their canonical key; unknown keys are
/// kept as-is.
pub(crate) fn group_observations<'a>(
    observations: &'a [FieldObservation],
    registry: &FieldRegistry,
) -> BTreeMap<String, Vec<&'a FieldObservation>> {
    let mut groups: BTreeMap<String, Vec<&FieldObservation>> = BTreeMap::new();
    for observation in observations {
        if normalize_value(&observation.value).is_empty() {
            continue;
        }
        let key = registry
            .resolve(&observation.field_key)
            .map(|d| d.field_key.clone())
            .unwrap_or_else(|| observation.field_key.clone());
        groups.entry(key).or_default().push(observation);
    }
    groups
}

fn is_conflicting(values: &[&FieldObservation], numeric: bool, config: &ReconcilerConfig) -> bool {
    if !numeric {
        let distinct: BTreeSet<String> = values.iter().map(|o| normalize_value(&o.value)).collect();
        return distinct.len() > 1;
    }

    let mut numbers = Vec::new();
    let mut unparsed = BTreeSet::new();
    for observation in values {
        match parse_numeric(&observation.value) {
            Some(n) => numbers.push(n),
            None => {
                unparsed.insert(normalize_value(&observation.value));
            }
        }
    }
    count_clusters(&numbers, config) + unparsed.len() > 1
}

/// Compute missing and conflicting fields for a set of observations
///
/// # Examples
///
/// ```
/// use quarry_reconciler::{analyze, FieldRegistry, ReconcilerConfig};
///
/// let analysis = analyze(&[], &FieldRegistry::standard(), &ReconcilerConfig::default());
/// assert_eq!(analysis.missing_fields, vec!["business_name", "owner_name", "tax_id"]);
/// assert!(analysis.conflicting_fields.is_empty());
/// ```
pub fn analyze(
    observations: &[FieldObservation],
    registry: &FieldRegistry,
    config: &ReconcilerConfig,
) -> FieldAnalysis {
    let groups = group_observations(observations, registry);
    let label = |key: &str| {
        registry
            .get(key)
            .map(|d| d.display_label.clone())
            .unwrap_or_else(|| key.to_string())
    };

    let mut missing_fields: Vec<String> = registry
        .required()
        .filter(|d| !groups.contains_key(&d.field_key))
        .map(|d| d.field_key.clone())
        .collect();

    let mut conflicting_fields: Vec<String> = groups
        .iter()
        .filter(|(key, values)| {
            let numeric = registry.get(key).is_some_and(|d| d.is_numeric());
            is_conflicting(values, numeric, config)
        })
        .map(|(key, _)| key.clone())
        .collect();

    missing_fields.sort();
    missing_fields.dedup();
    conflicting_fields.sort();
    conflicting_fields.dedup();

    let mut warnings: Vec<String> = missing_fields
        .iter()
        .map(|key| format!("Missing {}", label(key)))
        .chain(conflicting_fields.iter().map(|key| format!("Conflicting {}", label(key))))
        .collect();
    warnings.sort();
    warnings.dedup();

    FieldAnalysis {
        missing_fields,
        conflicting_fields,
        warnings,
    }
}
