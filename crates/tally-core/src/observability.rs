//! Observability infrastructure for Tally.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors shared by all components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `tally_sheets=debug`)
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
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for spreadsheet operations with standard fields.
///
/// # Example
///
/// ```rust
/// use tally_core::observability::sheet_span;
///
/// let span = sheet_span("append", "1BxiMVs0XRA5nFMdKvBdBZjgmUUqptlbs74OgvE2upms", "Transactions");
/// let _guard = span.enter();
/// // ... issue the spreadsheet call
/// ```
#[must_use]
pub fn sheet_span(operation: &str, spreadsheet_id: &str, sheet_name: &str) -> Span {
    tracing::info_span!(
        "sheet",
        op = operation,
        spreadsheet_id = spreadsheet_id,
        sheet_name = sheet_name,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        // Should not panic (uses Once internally)
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty); // Second call should be no-op
    }

    #[test]
    fn test_sheet_span_creates_span() {
        let span = sheet_span("append", "sheet-id", "Transactions");
        let _guard = span.enter();
        tracing::info!("test message in span");
    }
}
