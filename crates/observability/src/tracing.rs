//! Tracing subscriber initialization.
//!
//! The filter comes from `RUST_LOG` and defaults to `info`. Token values never reach
//! the subscriber: aggregates and requests that carry them redact their `Debug`
//! output, and spans skip them.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line with timestamps (production).
    #[default]
    Json,
    /// Human-readable lines (local development).
    Text,
}

impl LogFormat {
    pub fn for_environment(development: bool) -> Self {
        if development {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Returns `false` when one was already installed.
pub fn init(format: LogFormat) -> bool {
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_current_span(true)
            .with_target(false)
            .try_init()
            .is_ok(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(true)
            .try_init()
            .is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_follows_environment() {
        assert_eq!(LogFormat::for_environment(true), LogFormat::Text);
        assert_eq!(LogFormat::for_environment(false), LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Json);
    }

    #[test]
    fn second_init_is_a_no_op() {
        // Whichever call wins, the other must not panic.
        let first = init(LogFormat::Json);
        let second = init(LogFormat::Text);
        assert!(!(first && second));
        ::tracing::info!("subscriber installed");
    }
}
