//! Field registry
//!
//! The fixed, ordered list of fields the reconciler knows about. Providers emit
//! keys in whatever spelling the model chose (`Tax ID`, `ein`, `FEIN`); lookups
//! compare [`canonical_key`]s so all of those resolve to `tax_id`.

use quarry_domain::FieldDefinition;
use std::collections::HashMap;

/// Lookup form of a key: ASCII alphanumerics only, lowercased
///
/// ```
/// use quarry_reconciler::canonical_key;
///
/// assert_eq!(canonical_key("Tax ID"), "taxid");
/// assert_eq!(canonical_key("tax_id"), "taxid");
/// ```
pub fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Ordered set of field definitions with key/alias lookup
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    definitions: Vec<FieldDefinition>,
    index: HashMap<String, usize>,
}

impl FieldRegistry {
    /// Build a registry from definitions
    ///
    /// Keys are claimed in order: a key or alias already taken by an earlier
    /// definition keeps pointing there.
    pub fn new(definitions: Vec<FieldDefinition>) -> Self {
        let mut index = HashMap::new();
        for (position, definition) in definitions.iter().enumerate() {
            let names = std::iter::once(&definition.field_key).chain(definition.aliases.iter());
            for name in names {
                let key = canonical_key(name);
                if !key.is_empty() {
                    index.entry(key).or_insert(position);
                }
            }
        }
        Self { definitions, index }
    }

    /// The built-in registry of business, owner, financial and banking fields
    pub fn standard() -> Self {
        const BANK: &[&str] = &["bank_statement"];

        Self::new(vec![
            // business
            FieldDefinition::text("business_name", "Business Name", "business")
                .required()
                .with_aliases(&["legal_name", "company_name", "business_legal_name"]),
            FieldDefinition::text("dba_name", "DBA Name", "business")
                .with_aliases(&["dba", "doing_business_as", "trade_name"]),
            FieldDefinition::text("tax_id", "Tax ID", "business")
                .required()
                .with_aliases(&["ein", "fein", "tin", "federal_tax_id", "employer_identification_number"]),
            FieldDefinition::text("entity_type", "Entity Type", "business")
                .with_aliases(&["business_type", "legal_entity_type"]),
            FieldDefinition::text("business_address", "Business Address", "business")
                .with_aliases(&["address", "street_address"]),
            FieldDefinition::text("business_phone", "Business Phone", "business")
                .with_aliases(&["phone", "phone_number"]),
            FieldDefinition::text("industry", "Industry", "business").with_aliases(&["naics_description"]),
            FieldDefinition::text("business_start_date", "Business Start Date", "business")
                .with_aliases(&["date_established", "inception_date"]),
            // owner
            FieldDefinition::text("owner_name", "Owner Name", "owner")
                .required()
                .with_aliases(&["owner", "principal_name", "guarantor_name"]),
            FieldDefinition::text("ownership_percentage", "Ownership Percentage", "owner")
                .with_aliases(&["ownership", "ownership_pct"]),
            FieldDefinition::numeric("credit_score", "Credit Score", "owner")
                .with_aliases(&["fico", "fico_score"])
                .only_for(&["credit_report", "application"]),
            // financial
            FieldDefinition::numeric("total_revenue", "Total Revenue", "financial")
                .with_aliases(&["revenue", "gross_revenue", "annual_revenue", "gross_sales"]),
            FieldDefinition::numeric("requested_amount", "Requested Amount", "financial")
                .with_aliases(&["amount_requested", "loan_amount"])
                .only_for(&["application"]),
            // banking
            FieldDefinition::text("bank_name", "Bank Name", "banking").only_for(BANK),
            FieldDefinition::text("account_number", "Account Number", "banking")
                .with_aliases(&["account_no", "acct_number"])
                .only_for(BANK),
            FieldDefinition::numeric("average_daily_balance", "Average Daily Balance", "banking")
                .with_aliases(&["avg_daily_balance", "adb"])
                .only_for(BANK),
            FieldDefinition::numeric("ending_balance", "Ending Balance", "banking")
                .with_aliases(&["closing_balance"])
                .only_for(BANK),
            FieldDefinition::numeric("total_deposits", "Total Deposits", "banking")
                .with_aliases(&["deposits", "deposit_total"])
                .only_for(BANK),
            FieldDefinition::numeric("nsf_count", "NSF Count", "banking")
                .with_aliases(&["nsf", "nsfs", "returned_items"])
                .only_for(BANK),
        ])
    }

    /// Resolve a key or alias in any spelling
    pub fn resolve(&self, name: &str) -> Option<&FieldDefinition> {
        self.index
            .get(&canonical_key(name))
            .map(|&position| &self.definitions[position])
    }

    /// Definition for a canonical field key
    pub fn get(&self, field_key: &str) -> Option<&FieldDefinition> {
        self.definitions.iter().find(|d| d.field_key == field_key)
    }

    /// Every definition, in registry order
    pub fn definitions(&self) -> &[FieldDefinition] {
        &self.definitions
    }

    /// Required definitions, in registry order
    pub fn required(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.definitions.iter().filter(|d| d.required)
    }

    /// Keys of numeric fields
    pub fn numeric_keys(&self) -> Vec<&str> {
        self.definitions
            .iter()
            .filter(|d| d.is_numeric())
            .map(|d| d.field_key.as_str())
            .collect()
    }

    /// Every canonical key, in registry order
    pub fn keys(&self) -> Vec<String> {
        self.definitions.iter().map(|d| d.field_key.clone()).collect()
    }

    /// Number of definitions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
