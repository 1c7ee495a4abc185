//! Audit events
//!
//! Events are security- or operator-relevant facts (a rejected content reference,
//! a case entering a missing/conflicting state, a kill-switch flip). Sinks are
//! best-effort: a failing sink logs and moves on, it never fails the caller.

use crate::traits::AuditSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of audit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// Content storage refused a reference
    StorageInputRejected,
    /// A case's set of missing required fields changed to a new non-empty set
    MissingFieldsFlagged,
    /// A case's set of conflicting fields changed to a new non-empty set
    ConflictingFieldsFlagged,
    /// The extraction kill switch was flipped
    KillSwitchChanged,
    /// A job was administratively reset or resumed
    JobReset,
}

impl AuditKind {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::StorageInputRejected => "storage_input_rejected",
            AuditKind::MissingFieldsFlagged => "missing_fields_flagged",
            AuditKind::ConflictingFieldsFlagged => "conflicting_fields_flagged",
            AuditKind::KillSwitchChanged => "kill_switch_changed",
            AuditKind::JobReset => "job_reset",
        }
    }

    /// Parse from the storage representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "storage_input_rejected" => Some(AuditKind::StorageInputRejected),
            "missing_fields_flagged" => Some(AuditKind::MissingFieldsFlagged),
            "conflicting_fields_flagged" => Some(AuditKind::ConflictingFieldsFlagged),
            "kill_switch_changed" => Some(AuditKind::KillSwitchChanged),
            "job_reset" => Some(AuditKind::JobReset),
            _ => None,
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// What happened
    pub kind: AuditKind,

    /// Document, case or flag the event is about
    pub subject: String,

    /// Structured details
    pub detail: serde_json::Value,

    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Create an event
    pub fn new(
        kind: AuditKind,
        subject: impl Into<String>,
        detail: serde_json::Value,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail,
            recorded_at,
        }
    }
}

/// Sink that keeps events in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Vec<AuditEvent>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Events of one kind
    pub fn events_of(&self, kind: AuditKind) -> Vec<&AuditEvent> {
        self.events.iter().filter(|e| e.kind == kind).collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            AuditKind::StorageInputRejected,
            AuditKind::MissingFieldsFlagged,
            AuditKind::ConflictingFieldsFlagged,
            AuditKind::KillSwitchChanged,
            AuditKind::JobReset,
        ] {
            assert_eq!(AuditKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AuditKind::parse("unknown"), None);
    }

    #[test]
    fn test_memory_sink() {
        let mut sink = MemoryAuditSink::new();
        let now = Utc::now();
        sink.record(AuditEvent::new(AuditKind::JobReset, "doc-1", json!({}), now));
        sink.record(AuditEvent::new(
            AuditKind::KillSwitchChanged,
            "extraction",
            json!({"disabled": true}),
            now,
        ));

        assert_eq!(sink.events().len(), 2);
        assert_eq!(sink.events_of(AuditKind::JobReset)[0].subject, "doc-1");
    }
}
