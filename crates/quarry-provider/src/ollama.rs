//! Ollama Provider Implementation
//!
//! Field extraction through a local Ollama model.
//!
//! # Features
//!
//! - Async HTTP communication with the Ollama generate API in JSON mode
//! - Text documents are inlined in the prompt; images are sent base64-encoded
//!   to vision models
//! - Retry of transient HTTP failures with exponential backoff
//! - Timeouts reported as [`ProviderError::Timeout`]
//!
//! # Examples
//!
//! ```no_run
//! use quarry_provider::OllamaProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "llama3.2-vision")
//!     .unwrap()
//!     .with_fields(vec!["business_name".to_string(), "tax_id".to_string()]);
//! ```

use crate::parse_json_reply;
use async_trait::async_trait;
use base64::Engine;
use quarry_domain::traits::ExtractionProvider;
use quarry_domain::{ExtractionOutput, ExtractionRequest, ProviderError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "llama3.2-vision";

/// Default timeout for a single HTTP request (60 seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of HTTP attempts per extraction
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Largest text document inlined in a prompt
const MAX_PROMPT_CHARS: usize = 100_000;

/// Ollama API provider for local field extraction
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
    fields: Vec<String>,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Shape the model is asked to answer with
#[derive(Deserialize, Default)]
struct ModelReply {
    #[serde(default)]
    text: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

enum Payload {
    Text(String),
    Image(String),
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (a vision model is needed for images)
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a provider with a custom per-request timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Failed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            timeout,
            max_retries: DEFAULT_MAX_RETRIES,
            fields: Vec::new(),
        })
    }

    /// Set the maximum number of HTTP attempts
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Field keys the model should look for
    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    fn payload(request: &ExtractionRequest) -> Result<Payload, ProviderError> {
        let mime = request.mime_type.to_ascii_lowercase();
        if mime.starts_with("text/") || mime.starts_with("application/json") {
            let text = String::from_utf8_lossy(&request.bytes);
            let text: String = text.chars().take(MAX_PROMPT_CHARS).collect();
            Ok(Payload::Text(text))
        } else if mime.starts_with("image/png") || mime.starts_with("image/jpeg") {
            Ok(Payload::Image(
                base64::engine::general_purpose::STANDARD.encode(&request.bytes),
            ))
        } else {
            Err(ProviderError::UnsupportedMimeType(request.mime_type.clone()))
        }
    }

    fn prompt(&self, file_name: &str, document_text: Option<&str>) -> String {
        let wanted = if self.fields.is_empty() {
            "any business, owner, financial and banking fields you can find".to_string()
        } else {
            self.fields.join(", ")
        };

        let mut prompt = format!(
            "Extract structured data from the document \"{}\".\n\
             Fields to look for: {}.\n\
             Return ONLY a JSON object of the form \
             {{\"text\": \"<full document text>\", \"fields\": {{\"<field_key>\": \"<value>\"}}}}. \
             Omit fields that are not present. Copy values exactly as written.",
            file_name, wanted
        );

        if let Some(text) = document_text {
            prompt.push_str("\n\n--- DOCUMENT START ---\n");
            prompt.push_str(text);
            prompt.push_str("\n--- DOCUMENT END ---");
        }
        prompt
    }

    async fn generate(&self, body: &OllamaGenerateRequest) -> Result<String, ProviderError> {
        let url = format!("{}/api/generate", self.endpoint);
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self.client.post(&url).json(body).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<OllamaGenerateResponse>()
                            .await
                            .map(|r| r.response)
                            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {}", e)));
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(ProviderError::Failed(format!("Model not available: {}", self.model)));
                    }
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    last_error = Some(ProviderError::Failed(format!("HTTP {}: {}", status, error_text)));
                }
                Err(e) if e.is_timeout() => {
                    // Another attempt would blow the caller's time budget
                    return Err(ProviderError::Timeout(self.timeout));
                }
                Err(e) => {
                    last_error = Some(ProviderError::Failed(format!("Request failed: {}", e)));
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                let delay = Duration::from_millis(500 * 2u64.pow(attempts - 1));
                warn!(attempt = attempts, ?delay, "Ollama request failed, retrying");
                tokio::time::sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Failed("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl ExtractionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionOutput, ProviderError> {
        let payload = Self::payload(&request)?;

        let (prompt, images, inline_text) = match payload {
            Payload::Text(text) => (self.prompt(&request.file_name, Some(&text)), Vec::new(), Some(text)),
            Payload::Image(image) => (self.prompt(&request.file_name, None), vec![image], None),
        };

        let body = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt,
            stream: false,
            format: "json",
            images,
        };

        debug!(model = %self.model, file_name = %request.file_name, "Calling Ollama");
        let reply = self.generate(&body).await?;

        let value = parse_json_reply(&reply).map_err(ProviderError::InvalidResponse)?;
        let parsed: ModelReply = serde_json::from_value(value)
            .map_err(|e| ProviderError::InvalidResponse(format!("Unexpected reply shape: {}", e)))?;

        let text = match inline_text {
            Some(original) if parsed.text.is_empty() => original,
            _ => parsed.text,
        };

        Ok(ExtractionOutput {
            text,
            structured_json: Some(Value::Object(parsed.fields)),
            model: self.model.clone(),
            provider: "ollama".to_string(),
        })
    }
}
