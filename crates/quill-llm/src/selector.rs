//! Change-size based model recommendation
//!
//! Every adapter carries a [`TierTable`] with the same shape: a breaking
//! change outranks the large thresholds, which outrank the medium thresholds,
//! which outrank the standard tier. Only thresholds and model names vary.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::provider::Provider;

/// Size signals describing the change a completion is about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeSignals {
    /// Number of files touched
    pub files_changed: usize,
    /// Number of lines added plus removed
    pub lines_changed: usize,
    /// Whether the change is breaking or otherwise complex
    pub breaking: bool,
}

/// Coarse size bucket, ordered from smallest to largest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Small,
    Medium,
    Large,
    Breaking,
}

impl Tier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Breaking => "breaking",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tier is reached when either count meets its bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Threshold {
    pub files: usize,
    pub lines: usize,
}

impl Threshold {
    pub const fn new(files: usize, lines: usize) -> Self {
        Self { files, lines }
    }

    const fn reached_by(self, signals: &ChangeSignals) -> bool {
        signals.files_changed >= self.files || signals.lines_changed >= self.lines
    }
}

/// Model names per tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierModels {
    pub small: String,
    pub medium: String,
    pub large: String,
    pub breaking: String,
}

impl TierModels {
    pub fn new(small: &str, medium: &str, large: &str, breaking: &str) -> Self {
        Self {
            small: small.to_owned(),
            medium: medium.to_owned(),
            large: large.to_owned(),
            breaking: breaking.to_owned(),
        }
    }

    /// Same model for every tier, for backends pinned to a single deployment
    pub fn uniform(model: &str) -> Self {
        Self::new(model, model, model, model)
    }

    fn for_tier(&self, tier: Tier) -> &str {
        match tier {
            Tier::Small => &self.small,
            Tier::Medium => &self.medium,
            Tier::Large => &self.large,
            Tier::Breaking => &self.breaking,
        }
    }
}

/// Per-adapter decision table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierTable {
    pub large: Threshold,
    pub medium: Threshold,
    pub models: TierModels,
}

impl TierTable {
    /// Classify the change; first matching row wins
    pub const fn tier(&self, signals: &ChangeSignals) -> Tier {
        if signals.breaking {
            Tier::Breaking
        } else if self.large.reached_by(signals) {
            Tier::Large
        } else if self.medium.reached_by(signals) {
            Tier::Medium
        } else {
            Tier::Small
        }
    }

    /// Recommend a model with a short justification
    pub fn recommend(&self, signals: &ChangeSignals) -> ModelRecommendation {
        let tier = self.tier(signals);
        let files = signals.files_changed;
        let lines = signals.lines_changed;

        let reason = match tier {
            Tier::Breaking => "breaking change detected; using the most capable model".to_owned(),
            Tier::Large => format!("large change ({files} files, {lines} lines); using a high-capacity model"),
            Tier::Medium => format!("moderate change ({files} files, {lines} lines); using a balanced model"),
            Tier::Small => format!("small change ({files} files, {lines} lines); the standard model is sufficient"),
        };

        ModelRecommendation {
            model: self.models.for_tier(tier).to_owned(),
            reason,
            tier,
        }
    }
}

/// Recommended model plus the reason for choosing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRecommendation {
    pub model: String,
    pub reason: String,
    pub tier: Tier,
}

/// Named seam over the active adapter's recommendation table
pub struct ModelSelector {
    active: Arc<dyn Provider>,
}

impl ModelSelector {
    pub fn new(active: Arc<dyn Provider>) -> Self {
        Self { active }
    }

    /// Recommendation from the active adapter, `None` when no adapter is usable
    pub fn recommend(&self, signals: &ChangeSignals) -> Option<ModelRecommendation> {
        if !self.active.is_configured() {
            return None;
        }

        Some(self.active.recommend_model(signals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TierTable {
        TierTable {
            large: Threshold::new(10, 500),
            medium: Threshold::new(4, 100),
            models: TierModels::new("mini", "base", "big", "max"),
        }
    }

    fn signals(files_changed: usize, lines_changed: usize, breaking: bool) -> ChangeSignals {
        ChangeSignals {
            files_changed,
            lines_changed,
            breaking,
        }
    }

    #[test]
    fn small_change_gets_standard_model() {
        let rec = table().recommend(&signals(1, 20, false));
        assert_eq!(rec.tier, Tier::Small);
        assert_eq!(rec.model, "mini");
        assert!(rec.reason.contains("1 files, 20 lines"));
    }

    #[test]
    fn either_count_reaches_a_tier() {
        assert_eq!(table().tier(&signals(4, 0, false)), Tier::Medium);
        assert_eq!(table().tier(&signals(0, 100, false)), Tier::Medium);
        assert_eq!(table().tier(&signals(10, 0, false)), Tier::Large);
        assert_eq!(table().tier(&signals(0, 500, false)), Tier::Large);
    }

    #[test]
    fn breaking_outranks_thresholds() {
        let rec = table().recommend(&signals(0, 0, true));
        assert_eq!(rec.tier, Tier::Breaking);
        assert_eq!(rec.model, "max");
    }

    #[test]
    fn recommendation_never_shrinks_as_counts_grow() {
        let table = table();
        for breaking in [false, true] {
            for files in 0..15 {
                for lines in (0..700).step_by(25) {
                    let here = table.tier(&signals(files, lines, breaking));
                    assert!(table.tier(&signals(files + 1, lines, breaking)) >= here);
                    assert!(table.tier(&signals(files, lines + 25, breaking)) >= here);
                }
            }
        }
    }

    #[test]
    fn uniform_models_ignore_tier() {
        let table = TierTable {
            models: TierModels::uniform("deployment-a"),
            ..table()
        };
        assert_eq!(table.recommend(&signals(50, 5000, true)).model, "deployment-a");
        assert_eq!(table.recommend(&signals(0, 0, false)).model, "deployment-a");
    }

    #[test]
    fn tiers_render_lowercase() {
        assert_eq!(Tier::Breaking.to_string(), "breaking");
        assert_eq!(serde_json::to_string(&Tier::Medium).unwrap(), "\"medium\"");
    }
}
