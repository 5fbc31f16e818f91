//! Log output for hosts embedding quill
//!
//! The provider core only emits `tracing` events; this crate installs the
//! subscriber that renders them.

use quill_config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Filter used when the configured directive cannot be parsed
const FALLBACK_FILTER: &str = "info";

/// Initialize the global `tracing` subscriber
///
/// Honours `RUST_LOG` when set, otherwise the configured filter directive.
/// An unparseable directive is reported through the new subscriber once it
/// is installed.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed
pub fn init(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let (filter, rejected) = build_filter(std::env::var("RUST_LOG").ok().as_deref(), &config.filter);

    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Text => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            registry.with(fmt_layer).try_init()
        }
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_target(true);
            registry.with(fmt_layer).try_init()
        }
    };

    result.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(rejected) = rejected {
        tracing::warn!(
            directive = %rejected.directive,
            error = %rejected.reason,
            fallback = FALLBACK_FILTER,
            "invalid log filter, using fallback"
        );
    }
    tracing::debug!(format = ?config.format, "logging initialized");

    Ok(())
}

/// A filter directive that failed to parse
#[derive(Debug)]
struct RejectedDirective {
    directive: String,
    reason: String,
}

/// Resolve the effective filter from an environment override and the configured directive
fn build_filter(env_override: Option<&str>, configured: &str) -> (EnvFilter, Option<RejectedDirective>) {
    let directive = env_override.filter(|d| !d.trim().is_empty()).unwrap_or(configured);

    match EnvFilter::try_new(directive) {
        Ok(filter) => (filter, None),
        Err(e) => (
            EnvFilter::new(FALLBACK_FILTER),
            Some(RejectedDirective {
                directive: directive.to_owned(),
                reason: e.to_string(),
            }),
        ),
    }
}
