//! Process-wide logging setup.
//!
//! Worker threads log through the `log` facade; the pipeline emits `tracing`
//! spans. Both end up in the same `tracing-subscriber` registry: `log`
//! records are bridged by [`tracing_log::LogTracer`].

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install log bridge: {0}")]
    LogBridge(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber and the `log` bridge.
///
/// Returns an error when a global logger is already installed; callers that
/// may run twice (tests, embedding applications) can ignore it.
pub fn init_logging(format: LogFormat) -> Result<(), TelemetryError> {
    let fmt_layer = match format {
        LogFormat::Text => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    let subscriber = Registry::default().with(fmt_layer).with(env_filter());

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| TelemetryError::LogBridge(e.to_string()))?;

    Ok(())
}
