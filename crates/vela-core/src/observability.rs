//! Observability infrastructure for vela.
//!
//! Structured logging with consistent spans. This module provides the
//! initialization helper and span constructors shared by the library
//! crates and the CLI.

use std::str::FromStr;
use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(format!("unknown log format '{other}' (expected json or pretty)")),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `vela_launch=debug`)
///
/// # Example
///
/// ```rust
/// use vela_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_target(false))
                    .init();
            }
        }
    });
}

/// Creates a span for job submission with standard fields.
///
/// # Example
///
/// ```rust
/// use vela_core::observability::submission_span;
///
/// let span = submission_span("execute", "wordcount-nightly", "acme-analytics");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn submission_span(operation: &str, job_name: &str, project: &str) -> Span {
    tracing::info_span!(
        "submission",
        op = operation,
        job_name = job_name,
        project = project,
    )
}

/// Creates a span for a single capture hook invocation.
#[must_use]
pub fn capture_span(hook: &str, spec: &str) -> Span {
    tracing::info_span!("capture", hook = hook, spec = spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json); // Second call should be no-op
    }

    #[test]
    fn test_log_format_parses() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_span_helpers_create_spans() {
        let span = submission_span("execute", "job", "project");
        let _guard = span.enter();
        tracing::info!("submission message");

        let span = capture_span("gcs_profile_writer", "trace-1");
        let _guard = span.enter();
        tracing::info!("capture message");
    }
}
