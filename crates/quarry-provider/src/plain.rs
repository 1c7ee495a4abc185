//! Passthrough provider for documents that are already text
//!
//! - `application/json`: the object becomes the structured output as-is
//! - `text/*`: `Label: value` lines become structured fields keyed by the
//!   snake-cased label; the whole text is kept as extracted text
//!
//! Any other MIME type is reported as unsupported.

use async_trait::async_trait;
use quarry_domain::traits::ExtractionProvider;
use quarry_domain::{ExtractionOutput, ExtractionRequest, ProviderError};
use serde_json::{Map, Value};

const PROVIDER_NAME: &str = "plain_text";
const MODEL_NAME: &str = "passthrough";

/// Extraction provider that reads text and JSON documents directly
#[derive(Debug, Clone, Default)]
pub struct PlainTextProvider;

impl PlainTextProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }

    /// Whether this provider can handle `mime_type`
    pub fn supports(mime_type: &str) -> bool {
        let essence = essence(mime_type);
        essence == "application/json" || essence.starts_with("text/")
    }
}

/// MIME type without parameters, lowercased (`text/plain; charset=utf-8` → `text/plain`)
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn snake_case(label: &str) -> String {
    let mut key = String::with_capacity(label.len());
    for c in label.trim().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    key.trim_matches('_').to_string()
}

/// `Label: value` lines as a JSON object; later duplicates win
fn fields_from_text(text: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let key = snake_case(label);
        let value = value.trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }
        fields.insert(key, Value::String(value.to_string()));
    }
    fields
}

#[async_trait]
impl ExtractionProvider for PlainTextProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ProviderError> {
        if !Self::supports(&request.mime_type) {
            return Err(ProviderError::UnsupportedMimeType(request.mime_type));
        }

        let text = String::from_utf8(request.bytes)
            .map_err(|e| ProviderError::InvalidResponse(format!("{} is not UTF-8: {}", request.file_name, e)))?;

        let structured = if essence(&request.mime_type) == "application/json" {
            let value: Value = serde_json::from_str(&text)
                .map_err(|e| ProviderError::InvalidResponse(format!("Invalid JSON document: {}", e)))?;
            if !value.is_object() {
                return Err(ProviderError::InvalidResponse(
                    "JSON document must be an object".to_string(),
                ));
            }
            value
        } else {
            Value::Object(fields_from_text(&text))
        };

        Ok(ExtractionOutput {
            text,
            structured_json: Some(structured),
            model: MODEL_NAME.to_string(),
            provider: PROVIDER_NAME.to_string(),
        })
    }
}
