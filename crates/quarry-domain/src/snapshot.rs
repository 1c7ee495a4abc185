//! Reconciled case-level views

use crate::{CaseId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Missing/conflicting computation over a set of observations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAnalysis {
    /// Required fields with no surviving value (sorted, unique)
    pub missing_fields: Vec<String>,

    /// Fields whose values disagree (sorted, unique)
    pub conflicting_fields: Vec<String>,

    /// `Missing <label>` / `Conflicting <label>` messages (sorted, unique)
    pub warnings: Vec<String>,
}

impl FieldAnalysis {
    /// Whether every required field is present and nothing conflicts
    pub fn is_clean(&self) -> bool {
        self.missing_fields.is_empty() && self.conflicting_fields.is_empty()
    }
}

/// A document that contributed a value to a field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldSource {
    /// Contributing document
    pub document_id: DocumentId,

    /// Its category
    pub category: String,
}

/// The winning value for one field plus everything that contributed to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    /// Canonical field key
    pub field_key: String,

    /// Winning raw value
    pub value: String,

    /// Winning value after normalization
    pub normalized: String,

    /// Confidence of the winning observation
    pub confidence: f64,

    /// Document that supplied the winning value
    pub document_id: DocumentId,

    /// Category of that document
    pub document_category: String,

    /// When the winning value was observed
    pub observed_at: DateTime<Utc>,

    /// Every contributing document (sorted, unique)
    pub sources: Vec<FieldSource>,
}

/// Persisted case-level field view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightSnapshot {
    /// Case the snapshot describes
    pub case_id: CaseId,

    /// Winning value per field key
    pub fields: BTreeMap<String, ResolvedField>,

    /// Winning values grouped by source document category
    pub by_document_category: BTreeMap<String, BTreeMap<String, String>>,

    /// Winning values grouped by registry category tag
    pub by_field_category: BTreeMap<String, BTreeMap<String, String>>,

    /// Required fields with no value
    pub missing_fields: Vec<String>,

    /// Fields with disagreeing values
    pub conflicting_fields: Vec<String>,

    /// Human-readable warnings
    pub warnings: Vec<String>,

    /// Number of observations the snapshot was built from
    pub observation_count: usize,

    /// When it was computed
    pub computed_at: DateTime<Utc>,
}

impl InsightSnapshot {
    /// Snapshot of a case with no observations yet
    pub fn empty(case_id: CaseId, computed_at: DateTime<Utc>) -> Self {
        Self {
            case_id,
            fields: BTreeMap::new(),
            by_document_category: BTreeMap::new(),
            by_field_category: BTreeMap::new(),
            missing_fields: Vec::new(),
            conflicting_fields: Vec::new(),
            warnings: Vec::new(),
            observation_count: 0,
            computed_at,
        }
    }

    /// The missing/conflicting part of the snapshot
    pub fn analysis(&self) -> FieldAnalysis {
        FieldAnalysis {
            missing_fields: self.missing_fields.clone(),
            conflicting_fields: self.conflicting_fields.clone(),
            warnings: self.warnings.clone(),
        }
    }
}
