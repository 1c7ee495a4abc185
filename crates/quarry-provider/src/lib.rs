//! Quarry Extraction Providers
//!
//! Implementations of the `ExtractionProvider` trait from `quarry-domain`.
//!
//! # Providers
//!
//! - `MockProvider`: Scripted, deterministic provider for testing
//! - `PlainTextProvider`: Text and JSON passthrough, no model involved
//! - `OllamaProvider`: Local Ollama API integration
//!
//! # Examples
//!
//! ```
//! use quarry_provider::MockProvider;
//! use quarry_domain::traits::ExtractionProvider;
//! use quarry_domain::ExtractionRequest;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let provider = MockProvider::new(json!({"business_name": "Acme LLC"}));
//! let request = ExtractionRequest {
//!     bytes: b"...".to_vec(),
//!     mime_type: "application/pdf".to_string(),
//!     file_name: "app.pdf".to_string(),
//! };
//! let output = provider.extract(request).await.unwrap();
//! assert_eq!(output.structured_json, Some(json!({"business_name": "Acme LLC"})));
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod mock;
pub mod ollama;
pub mod plain;

pub use config::{build_provider, ProviderConfig, ProviderKind};
pub use mock::MockProvider;
pub use ollama::OllamaProvider;
pub use plain::PlainTextProvider;

/// Extract a JSON document from a model reply, tolerating markdown code fences
pub(crate) fn parse_json_reply(reply: &str) -> Result<serde_json::Value, String> {
    let json_str = if reply.contains("```json") {
        reply
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(reply)
            .trim()
    } else if reply.contains("```") {
        reply.split("```").nth(1).unwrap_or(reply).trim()
    } else {
        reply.trim()
    };

    serde_json::from_str(json_str).map_err(|e| {
        format!(
            "Invalid JSON ({}): {}",
            e,
            json_str.chars().take(200).collect::<String>()
        )
    })
}
