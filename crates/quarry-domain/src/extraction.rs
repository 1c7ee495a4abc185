//! Extraction request/response types and the document view used by workers

use crate::{CaseId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input handed to an extraction provider
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Raw document bytes
    pub bytes: Vec<u8>,

    /// MIME type of the bytes (e.g. `application/pdf`)
    pub mime_type: String,

    /// Original file name, for providers that sniff by extension
    pub file_name: String,
}

/// What a provider returns for a successful extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    /// Plain text recovered from the document
    pub text: String,

    /// Structured field output, if the provider produces one
    pub structured_json: Option<serde_json::Value>,

    /// Model that produced the output
    pub model: String,

    /// Provider name
    pub provider: String,
}

/// Persisted extraction output (one live row per document)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Document this result belongs to
    pub document_id: DocumentId,

    /// Provider name
    pub provider: String,

    /// Model name
    pub model: String,

    /// Extracted text
    pub extracted_text: String,

    /// Structured output
    pub structured_json: Option<serde_json::Value>,

    /// Free-form metadata about the run (job id, attempt, sizes)
    pub meta: serde_json::Value,

    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

/// Current version of a stored document, as seen by the extraction worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Document identifier
    pub document_id: DocumentId,

    /// Owning case
    pub case_id: CaseId,

    /// Monotonic version number (highest is current)
    pub version: u32,

    /// Where the bytes live (`file://...` or a storage-relative key)
    pub content_ref: String,

    /// MIME type, if known
    pub mime_type: Option<String>,

    /// Original file name
    pub file_name: String,

    /// Document category (e.g. `bank_statement`, `tax_return`)
    pub category: String,
}
