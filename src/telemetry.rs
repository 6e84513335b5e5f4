//! Tracing subscriber setup for processes embedding the kernel.
//!
//! `LOG_FORMAT=pretty` selects human-readable output; anything else emits
//! one JSON object per event. `RUST_LOG` overrides the default filter.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

const DEFAULT_FILTER: &str = "plant_route_kernel=info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Human-readable lines for local development.
    Pretty,
}

impl LogFormat {
    /// Read `LOG_FORMAT`, defaulting to JSON.
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("pretty") => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Install the global subscriber using `LOG_FORMAT` and `RUST_LOG`.
///
/// Fails if a global subscriber is already set.
pub fn init_tracing() -> Result<(), TryInitError> {
    try_init_tracing(LogFormat::from_env())
}

/// Install the global subscriber with an explicit format.
pub fn try_init_tracing(format: LogFormat) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .flatten_event(true),
            )
            .try_init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Another test may have installed a subscriber first
        let _ = try_init_tracing(LogFormat::Pretty);
        assert!(try_init_tracing(LogFormat::Json).is_err());
    }
}
