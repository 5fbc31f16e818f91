//! Static model fallback tables
//!
//! Each adapter carries a table keyed by substrings of model ids. When a
//! model is rejected, the first matching rule supplies replacement ids and
//! the adapter's default model closes the list, so suggestions are never
//! empty.

use crate::error::LlmError;

/// Alternatives offered for model ids containing `pattern`
#[derive(Debug, Clone, Copy)]
pub struct FallbackRule {
    /// Lowercase substring of the model id
    pub pattern: &'static str,
    /// Replacement ids, best first
    pub alternatives: &'static [&'static str],
}

impl FallbackRule {
    pub const fn new(pattern: &'static str, alternatives: &'static [&'static str]) -> Self {
        Self { pattern, alternatives }
    }
}

/// An adapter's fallback table plus its default model
#[derive(Debug, Clone)]
pub struct ModelFallbacks {
    rules: &'static [FallbackRule],
    default_model: String,
}

impl ModelFallbacks {
    pub fn new(rules: &'static [FallbackRule], default_model: impl Into<String>) -> Self {
        Self {
            rules,
            default_model: default_model.into(),
        }
    }

    /// Ranked replacements for `requested`, never empty
    ///
    /// The requested id itself is never suggested unless it is the only
    /// candidate left.
    pub fn alternatives(&self, requested: &str) -> Vec<String> {
        let needle = requested.to_lowercase();

        let mut candidates: Vec<String> = self
            .rules
            .iter()
            .find(|rule| needle.contains(rule.pattern))
            .map(|rule| rule.alternatives.iter().map(|&m| m.to_owned()).collect())
            .unwrap_or_default();
        candidates.push(self.default_model.clone());

        let mut ranked: Vec<String> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if candidate != requested && !ranked.contains(&candidate) {
                ranked.push(candidate);
            }
        }

        if ranked.is_empty() {
            ranked.push(self.default_model.clone());
        }
        ranked
    }

    /// `ModelNotFound` for `model` with its ranked alternatives
    pub fn not_found(&self, model: &str) -> LlmError {
        LlmError::ModelNotFound {
            model: model.to_owned(),
            alternatives: self.alternatives(model),
        }
    }

    /// Reject ids no backend would accept before spending a request on them
    pub fn check_model_id(&self, model: &str) -> Result<(), LlmError> {
        if model.is_empty() || model.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(self.not_found(model));
        }
        Ok(())
    }
}
