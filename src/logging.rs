//! Logging setup for the command line interface.
//!
//! The library itself only emits `tracing` events; installing a subscriber is
//! left to the binary (or any other embedding application).

use std::str::FromStr;
use std::sync::Once;

use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum LogFormat {
    /// JSON structured logs.
    Json,
    /// Human readable logs.
    #[default]
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Initializes the logging subsystem.
///
/// Levels are controlled through `RUST_LOG` and default to `info`. Calling
/// this more than once is a no-op.
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

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

/// Creates a span wrapping one create/update run of an HDX object.
#[must_use]
pub fn object_span(object_type: &str, operation: &str, identifier: &str) -> Span {
    tracing::info_span!(
        "hdx_object",
        object_type = object_type,
        op = operation,
        identifier = identifier,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("xml").is_err());
    }

    #[test]
    fn test_object_span_can_be_entered() {
        let span = object_span("dataset", "update", "ds1");
        let _guard = span.enter();
        tracing::info!("inside object span");
    }
}
