//! Provider selection

use crate::ollama::{DEFAULT_ENDPOINT, DEFAULT_MAX_RETRIES, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::{MockProvider, OllamaProvider, PlainTextProvider};
use quarry_domain::traits::ExtractionProvider;
use quarry_domain::ProviderError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which provider implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Always returns an empty structured object
    Mock,
    /// Text/JSON passthrough
    #[default]
    PlainText,
    /// Local Ollama model
    Ollama,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider implementation
    #[serde(default)]
    pub kind: ProviderKind,

    /// Ollama endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Ollama model
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP request timeout (in seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// HTTP attempts per extraction
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            endpoint: default_endpoint(),
            model: default_model(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl ProviderConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.kind == ProviderKind::Ollama {
            if self.endpoint.trim().is_empty() {
                return Err("endpoint cannot be empty".to_string());
            }
            if self.model.trim().is_empty() {
                return Err("model cannot be empty".to_string());
            }
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Build the configured provider
///
/// `field_keys` is forwarded to model-backed providers as the list of fields to
/// look for.
pub fn build_provider(
    config: &ProviderConfig,
    field_keys: Vec<String>,
) -> Result<Arc<dyn ExtractionProvider>, ProviderError> {
    let provider: Arc<dyn ExtractionProvider> = match config.kind {
        ProviderKind::Mock => Arc::new(MockProvider::default()),
        ProviderKind::PlainText => Arc::new(PlainTextProvider::new()),
        ProviderKind::Ollama => Arc::new(
            OllamaProvider::with_timeout(
                config.endpoint.clone(),
                config.model.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )?
            .with_max_retries(config.max_retries)
            .with_fields(field_keys),
        ),
    };
    Ok(provider)
}
