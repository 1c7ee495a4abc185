//! InsightStore implementation

use crate::{from_millis, to_millis, SqliteStore};
use quarry_domain::traits::InsightStore;
use quarry_domain::{CaseId, DocumentId, FieldObservation, InsightSnapshot};
use rusqlite::{params, OptionalExtension};

impl InsightStore for SqliteStore {
    fn observations_for_case(&self, case_id: &CaseId) -> Result<Vec<FieldObservation>, Self::Error> {
        let mut stmt = self.conn.prepare(
            "SELECT case_id, document_id, field_key, value, confidence, source_document_category, observed_at
             FROM field_observations WHERE case_id = ?1
             ORDER BY id",
        )?;

        let observations = stmt
            .query_map(params![case_id.as_str()], |row| {
                Ok(FieldObservation {
                    case_id: CaseId::from(row.get::<_, String>(0)?),
                    document_id: DocumentId::from(row.get::<_, String>(1)?),
                    field_key: row.get(2)?,
                    value: row.get(3)?,
                    confidence: row.get(4)?,
                    source_document_category: row.get(5)?,
                    observed_at: from_millis(6, row.get(6)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(observations)
    }

    fn latest_snapshot(&self, case_id: &CaseId) -> Result<Option<InsightSnapshot>, Self::Error> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM insight_snapshots WHERE case_id = ?1",
                params![case_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn save_snapshot(&mut self, snapshot: &InsightSnapshot) -> Result<(), Self::Error> {
        let raw = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO insight_snapshots (case_id, snapshot, computed_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(case_id) DO UPDATE SET
                 snapshot = excluded.snapshot,
                 computed_at = excluded.computed_at",
            params![snapshot.case_id.as_str(), raw, to_millis(snapshot.computed_at)],
        )?;
        Ok(())
    }
}
