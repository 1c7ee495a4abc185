//! Missing/conflicting transition signals
//!
//! A case is flagged when its missing (or conflicting) set becomes a new non-empty
//! set compared with the last persisted snapshot. Recomputing an unchanged case
//! emits nothing; clearing a set emits nothing either.

use chrono::{DateTime, Utc};
use quarry_domain::{AuditEvent, AuditKind, InsightSnapshot};
use serde_json::json;

fn flag(
    kind: AuditKind,
    current: &InsightSnapshot,
    fields: &[String],
    previous: &[String],
    now: DateTime<Utc>,
) -> Option<AuditEvent> {
    if fields.is_empty() || fields == previous {
        return None;
    }
    Some(AuditEvent::new(
        kind,
        current.case_id.to_string(),
        json!({
            "fields": fields,
            "previous": previous,
            "warnings": current.warnings,
        }),
        now,
    ))
}

/// Audit events for the transitions between `previous` and `current`
///
/// A case without a persisted snapshot counts as having empty sets.
pub fn transition_events(
    previous: Option<&InsightSnapshot>,
    current: &InsightSnapshot,
    now: DateTime<Utc>,
) -> Vec<AuditEvent> {
    let (previous_missing, previous_conflicting) = match previous {
        Some(snapshot) => (snapshot.missing_fields.as_slice(), snapshot.conflicting_fields.as_slice()),
        None => (&[][..], &[][..]),
    };

    [
        flag(
            AuditKind::MissingFieldsFlagged,
            current,
            &current.missing_fields,
            previous_missing,
            now,
        ),
        flag(
            AuditKind::ConflictingFieldsFlagged,
            current,
            &current.conflicting_fields,
            previous_conflicting,
            now,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}
