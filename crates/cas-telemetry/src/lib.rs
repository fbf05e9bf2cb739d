//! Structured logging init for the content store bridge.

#![deny(unsafe_code)]

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("tracing subscriber already set")]
    AlreadySet,
}

/// Initialize structured logging (JSON) with env filter.
/// Set RUST_LOG, e.g., "info,cas_bridge=debug".
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// Same as [`init_json_logging`] but surfaces a typed error instead of
/// silently swallowing an already-installed global subscriber.
pub fn try_init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadySet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_init_does_not_panic() {
        let _ = try_init_json_logging();
    }

    #[tokio::test]
    async fn second_init_reports_already_set() {
        // Whichever of these two calls is the first to run in this process
        // wins the global subscriber; the other is guaranteed to see it
        // already installed.
        let _ = try_init_json_logging();
        let second = try_init_json_logging();
        assert!(matches!(second, Err(TelemetryError::AlreadySet)));
    }
}
