//! Provider-agnostic completion core for quill
//!
//! Presents one completion interface over several LLM backends (`OpenAI`,
//! Azure `OpenAI`, Anthropic, Gemini, Vertex AI, Ollama), chooses the active
//! backend from configuration, and layers retry, model fallback, capability
//! description and change-size model recommendation on top.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod capabilities;
pub mod convert;
pub mod error;
pub mod fallback;
pub mod protocol;
pub mod provider;
pub mod registry;
pub mod retry;
pub mod selector;
pub mod service;
pub mod types;

pub use capabilities::CapabilityDescriptor;
pub use error::LlmError;
pub use provider::{ConnectionReport, ModelValidation, Provider, ValidationError, ValidationErrorKind};
pub use registry::{ProviderRegistry, Registration};
pub use retry::RetryPolicy;
pub use selector::{ChangeSignals, ModelRecommendation, ModelSelector, Tier};
pub use service::LlmService;
pub use types::{CallContext, CompletionRequest, CompletionResponse, FinishReason, Message, StreamEvent};
