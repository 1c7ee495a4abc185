//! DocumentCatalog implementation

use crate::{to_millis, SqliteStore, StoreError};
use chrono::{DateTime, Utc};
use quarry_domain::traits::DocumentCatalog;
use quarry_domain::{CaseId, DocumentId, DocumentVersion};
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};

fn version_from_row(row: &Row) -> rusqlite::Result<DocumentVersion> {
    Ok(DocumentVersion {
        document_id: DocumentId::from(row.get::<_, String>(0)?),
        version: row.get(1)?,
        case_id: CaseId::from(row.get::<_, String>(2)?),
        content_ref: row.get(3)?,
        mime_type: row.get(4)?,
        file_name: row.get(5)?,
        category: row.get(6)?,
    })
}

impl DocumentCatalog for SqliteStore {
    fn register_document(
        &mut self,
        document: DocumentVersion,
        now: DateTime<Utc>,
    ) -> Result<DocumentVersion, Self::Error> {
        if document.content_ref.trim().is_empty() {
            return Err(StoreError::InvalidData(format!(
                "document {} has an empty content reference",
                document.document_id
            )));
        }

        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM documents WHERE document_id = ?1",
            params![document.document_id.as_str()],
            |row| row.get(0),
        )?;
        let version = current.saturating_add(1);

        tx.execute(
            "INSERT INTO documents
                 (document_id, version, case_id, content_ref, mime_type, file_name, category, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                document.document_id.as_str(),
                version,
                document.case_id.as_str(),
                &document.content_ref,
                &document.mime_type,
                &document.file_name,
                &document.category,
                to_millis(now),
            ],
        )?;
        tx.commit()?;

        Ok(DocumentVersion { version, ..document })
    }

    fn current_version(&self, document_id: &DocumentId) -> Result<Option<DocumentVersion>, Self::Error> {
        let version = self
            .conn
            .query_row(
                "SELECT document_id, version, case_id, content_ref, mime_type, file_name, category
                 FROM documents WHERE document_id = ?1
                 ORDER BY version DESC LIMIT 1",
                params![document_id.as_str()],
                version_from_row,
            )
            .optional()?;
        Ok(version)
    }
}
