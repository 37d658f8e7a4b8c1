//! Logging initialization and span helpers.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use std::sync::Once;

use serde::{Deserialize, Serialize};
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Human-readable logs.
    #[default]
    Pretty,
}

/// Initializes the logging subsystem with an `info` default level.
///
/// Safe to call multiple times; subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `stackshift_core=debug`)
///
/// # Example
///
/// ```rust
/// use stackshift_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    init_logging_with_default(format, "info");
}

/// Initializes logging, using `default_directive` when `RUST_LOG` is unset.
pub fn init_logging_with_default(format: LogFormat, default_directive: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json().with_writer(std::io::stderr))
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stderr))
                    .init();
            }
        }
    });
}

/// Creates the span wrapping one migration attempt.
///
/// # Example
///
/// ```rust
/// use stackshift_core::observability::migration_span;
///
/// let span = migration_span("appA", "stackA", "stackB");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn migration_span(app: &str, source_stack: &str, target_stack: &str) -> Span {
    tracing::info_span!(
        "migration",
        app = app,
        source_stack = source_stack,
        target_stack = target_stack,
    )
}
