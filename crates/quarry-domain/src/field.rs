//! Field definitions and raw observations

use crate::{CaseId, DocumentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How values of a field are compared during reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Compared as numbers with tolerance
    Numeric,
    /// Compared as normalized strings
    Text,
}

/// Which document categories a field can be extracted from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppliesTo {
    /// Any document category
    All,
    /// Only the listed categories
    Categories(Vec<String>),
}

impl AppliesTo {
    /// Whether a document of `category` may carry this field
    pub fn includes(&self, category: &str) -> bool {
        match self {
            AppliesTo::All => true,
            AppliesTo::Categories(categories) => {
                categories.iter().any(|c| c.eq_ignore_ascii_case(category))
            }
        }
    }
}

/// Static registry entry describing one known field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Canonical key (e.g. `tax_id`)
    pub field_key: String,

    /// Human-readable label used in warnings
    pub display_label: String,

    /// Document categories the field applies to
    pub applies_to: AppliesTo,

    /// Whether a case is incomplete without it
    pub required: bool,

    /// Alternative keys providers may emit
    pub aliases: Vec<String>,

    /// Comparison kind
    pub kind: FieldKind,

    /// Registry category tag used to group snapshot values
    pub category: String,
}

impl FieldDefinition {
    /// Optional text field applying to every category
    pub fn text(key: &str, label: &str, category: &str) -> Self {
        Self {
            field_key: key.to_string(),
            display_label: label.to_string(),
            applies_to: AppliesTo::All,
            required: false,
            aliases: Vec::new(),
            kind: FieldKind::Text,
            category: category.to_string(),
        }
    }

    /// Optional numeric field applying to every category
    pub fn numeric(key: &str, label: &str, category: &str) -> Self {
        Self {
            kind: FieldKind::Numeric,
            ..Self::text(key, label, category)
        }
    }

    /// Mark the field as required
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Add provider aliases
    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Restrict to the given document categories
    pub fn only_for(mut self, categories: &[&str]) -> Self {
        self.applies_to = AppliesTo::Categories(categories.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Whether this is a numeric field
    pub fn is_numeric(&self) -> bool {
        self.kind == FieldKind::Numeric
    }
}

/// One raw field value extracted from one document (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldObservation {
    /// Owning case
    pub case_id: CaseId,

    /// Source document
    pub document_id: DocumentId,

    /// Canonical field key
    pub field_key: String,

    /// Raw value as extracted
    pub value: String,

    /// Provider confidence in [0, 1]
    pub confidence: f64,

    /// Category of the source document
    pub source_document_category: String,

    /// When the value was extracted
    pub observed_at: DateTime<Utc>,
}
