//! Ollama `/api/generate` wire format types

use serde::{Deserialize, Serialize};

/// Ollama generate request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaGenerateRequest {
    /// Local model tag, e.g. `llama3.1:8b`
    pub model: String,
    /// Flattened conversation
    pub prompt: String,
    /// System prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Base64 images without data URI prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    /// Whether to stream NDJSON chunks
    pub stream: bool,
    /// Output format, "json" for JSON mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Sampling options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
}

/// Ollama sampling options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OllamaOptions {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Ollama generate response, also the shape of every NDJSON line
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaGenerateResponse {
    /// Model tag
    #[serde(default)]
    pub model: String,
    /// Generated text (a fragment when streaming)
    #[serde(default)]
    pub response: String,
    /// Set on the final line
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped ("stop", "length")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Prompt tokens evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u32>,
    /// Tokens generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u32>,
    /// Error reported mid-stream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `GET /api/tags`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OllamaTags {
    /// Locally installed models
    #[serde(default)]
    pub models: Vec<OllamaModelTag>,
}

/// Installed model entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaModelTag {
    /// Tag name, e.g. `llama3.1:latest`
    pub name: String,
}

/// Response of `GET /api/version`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaVersion {
    /// Runtime version
    pub version: String,
}
