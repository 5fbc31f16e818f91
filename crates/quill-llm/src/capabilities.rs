//! Capability descriptors derived from model identifiers
//!
//! Each adapter owns an ordered table of `(pattern, delta)` rows. Rows whose
//! pattern occurs in the lowercased model id are applied top to bottom over an
//! all-false descriptor, so later rows refine earlier ones and an unknown
//! model simply keeps every flag off.

use serde::Serialize;

/// What a model/backend pairing supports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityDescriptor {
    /// Accepts image input
    pub vision: bool,
    /// Supports tool/function calling
    pub tool_use: bool,
    /// Can be constrained to JSON output
    pub json_mode: bool,
    /// Performs extended reasoning
    pub reasoning: bool,
    /// Context window of 100k tokens or more
    pub large_context: bool,
    /// Supports incremental streaming
    pub streaming: bool,
    /// Runs on the local machine
    pub local: bool,
}

impl CapabilityDescriptor {
    /// Names of the enabled capabilities
    pub fn features(&self) -> Vec<&'static str> {
        [
            ("vision", self.vision),
            ("tool_use", self.tool_use),
            ("json_mode", self.json_mode),
            ("reasoning", self.reasoning),
            ("large_context", self.large_context),
            ("streaming", self.streaming),
            ("local", self.local),
        ]
        .into_iter()
        .filter_map(|(name, enabled)| enabled.then_some(name))
        .collect()
    }
}

/// Partial update applied by a matching rule; `None` leaves a flag as is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilityDelta {
    pub vision: Option<bool>,
    pub tool_use: Option<bool>,
    pub json_mode: Option<bool>,
    pub reasoning: Option<bool>,
    pub large_context: Option<bool>,
    pub streaming: Option<bool>,
    pub local: Option<bool>,
}

impl CapabilityDelta {
    /// Delta that changes nothing
    pub const NONE: Self = Self {
        vision: None,
        tool_use: None,
        json_mode: None,
        reasoning: None,
        large_context: None,
        streaming: None,
        local: None,
    };

    #[must_use]
    pub const fn vision(mut self, value: bool) -> Self {
        self.vision = Some(value);
        self
    }

    #[must_use]
    pub const fn tool_use(mut self, value: bool) -> Self {
        self.tool_use = Some(value);
        self
    }

    #[must_use]
    pub const fn json_mode(mut self, value: bool) -> Self {
        self.json_mode = Some(value);
        self
    }

    #[must_use]
    pub const fn reasoning(mut self, value: bool) -> Self {
        self.reasoning = Some(value);
        self
    }

    #[must_use]
    pub const fn large_context(mut self, value: bool) -> Self {
        self.large_context = Some(value);
        self
    }

    #[must_use]
    pub const fn streaming(mut self, value: bool) -> Self {
        self.streaming = Some(value);
        self
    }

    #[must_use]
    pub const fn local(mut self, value: bool) -> Self {
        self.local = Some(value);
        self
    }

    fn apply_to(self, descriptor: &mut CapabilityDescriptor) {
        fn set(flag: &mut bool, value: Option<bool>) {
            if let Some(value) = value {
                *flag = value;
            }
        }

        set(&mut descriptor.vision, self.vision);
        set(&mut descriptor.tool_use, self.tool_use);
        set(&mut descriptor.json_mode, self.json_mode);
        set(&mut descriptor.reasoning, self.reasoning);
        set(&mut descriptor.large_context, self.large_context);
        set(&mut descriptor.streaming, self.streaming);
        set(&mut descriptor.local, self.local);
    }
}

/// One row of a capability table
#[derive(Debug, Clone, Copy)]
pub struct CapabilityRule {
    /// Lowercase substring matched against the model id
    pub pattern: &'static str,
    /// Flags set when the pattern matches
    pub delta: CapabilityDelta,
}

impl CapabilityRule {
    pub const fn new(pattern: &'static str, delta: CapabilityDelta) -> Self {
        Self { pattern, delta }
    }
}

/// Derive a descriptor for `model` from an ordered rule table
pub fn describe(rules: &[CapabilityRule], model: &str) -> CapabilityDescriptor {
    let model = model.to_ascii_lowercase();

    rules
        .iter()
        .filter(|rule| model.contains(rule.pattern))
        .fold(CapabilityDescriptor::default(), |mut descriptor, rule| {
            rule.delta.apply_to(&mut descriptor);
            descriptor
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &[CapabilityRule] = &[
        CapabilityRule::new("chat", CapabilityDelta::NONE.streaming(true).tool_use(true)),
        CapabilityRule::new("vision", CapabilityDelta::NONE.vision(true)),
        CapabilityRule::new("pro", CapabilityDelta::NONE.vision(true).large_context(true)),
        CapabilityRule::new("lite", CapabilityDelta::NONE.tool_use(false)),
    ];

    #[test]
    fn unknown_model_is_all_false() {
        assert_eq!(describe(RULES, "mystery-1"), CapabilityDescriptor::default());
        assert!(describe(RULES, "").features().is_empty());
    }

    #[test]
    fn matching_rows_accumulate() {
        let caps = describe(RULES, "chat-pro-2");
        assert!(caps.streaming);
        assert!(caps.tool_use);
        assert!(caps.vision);
        assert!(caps.large_context);
        assert!(!caps.reasoning);
    }

    #[test]
    fn later_rows_override_earlier_ones() {
        let caps = describe(RULES, "chat-lite");
        assert!(caps.streaming);
        assert!(!caps.tool_use);
    }

    #[test]
    fn matching_ignores_case() {
        assert!(describe(RULES, "Chat-VISION").vision);
    }

    #[test]
    fn features_lists_enabled_flags_in_order() {
        let caps = describe(RULES, "chat-vision");
        assert_eq!(caps.features(), vec!["vision", "tool_use", "streaming"]);
    }

    #[test]
    fn derivation_is_repeatable() {
        assert_eq!(describe(RULES, "chat-pro"), describe(RULES, "chat-pro"));
    }
}
