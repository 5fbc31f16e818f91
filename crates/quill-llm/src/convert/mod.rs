//! Conversion between the backend-agnostic types and vendor wire formats

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
