//! Operational flags and the audit log

use crate::{from_millis, json_column, to_millis, SqliteStore, StoreError};
use chrono::{DateTime, Utc};
use quarry_domain::traits::{AuditSink, OpsStore};
use quarry_domain::{AuditEvent, AuditKind};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension};
use tracing::warn;

/// Flag name of the extraction kill switch
pub const EXTRACTION_DISABLED_FLAG: &str = "extraction_disabled";

impl OpsStore for SqliteStore {
    fn extraction_disabled(&self) -> Result<bool, Self::Error> {
        let enabled: Option<bool> = self
            .conn
            .query_row(
                "SELECT enabled FROM ops_flags WHERE name = ?1",
                params![EXTRACTION_DISABLED_FLAG],
                |row| row.get(0),
            )
            .optional()?;
        Ok(enabled.unwrap_or(false))
    }

    fn set_extraction_disabled(&mut self, disabled: bool, now: DateTime<Utc>) -> Result<(), Self::Error> {
        self.conn.execute(
            "INSERT INTO ops_flags (name, enabled, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET enabled = excluded.enabled, updated_at = excluded.updated_at",
            params![EXTRACTION_DISABLED_FLAG, disabled, to_millis(now)],
        )?;
        Ok(())
    }
}

impl SqliteStore {
    fn insert_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO audit_log (kind, subject, detail, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.kind.as_str(),
                &event.subject,
                serde_json::to_string(&event.detail)?,
                to_millis(event.recorded_at),
            ],
        )?;
        Ok(())
    }

    /// Most recent audit events, newest first, optionally of one kind
    pub fn recent_audit_events(
        &self,
        kind: Option<AuditKind>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "SELECT kind, subject, detail, recorded_at FROM audit_log
             WHERE ?1 IS NULL OR kind = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;

        let events = stmt
            .query_map(params![kind.map(|k| k.as_str()), limit], |row| {
                let raw_kind: String = row.get(0)?;
                let kind = AuditKind::parse(&raw_kind).ok_or_else(|| {
                    crate::conversion_error(
                        0,
                        Type::Text,
                        StoreError::InvalidData(format!("Unknown audit kind: {}", raw_kind)),
                    )
                })?;
                let detail: String = row.get(2)?;
                Ok(AuditEvent {
                    kind,
                    subject: row.get(1)?,
                    detail: json_column(2, &detail)?,
                    recorded_at: from_millis(3, row.get(3)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }
}

impl AuditSink for SqliteStore {
    fn record(&mut self, event: AuditEvent) {
        if let Err(e) = self.insert_audit(&event) {
            warn!(kind = %event.kind, subject = %event.subject, error = %e, "Failed to record audit event");
        }
    }
}
