//! Tracing subscriber setup for the `fmx` binary.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to
//! the whole process.

use crate::config::ApplicationConfig;
use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(app: &ApplicationConfig) {
    let filter = env_filter(&app.log_level);
    let result = if app.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_configured_level_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(env_filter("warn").to_string(), "warn");
    }

    #[test]
    #[serial]
    fn test_rust_log_wins() {
        std::env::set_var("RUST_LOG", "fmx_daq=debug");
        let filter = env_filter("warn").to_string();
        std::env::remove_var("RUST_LOG");
        assert_eq!(filter, "fmx_daq=debug");
    }
}
