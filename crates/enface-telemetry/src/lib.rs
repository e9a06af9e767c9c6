//! Tracing subscriber setup shared by the broker binary and its tests.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Crates whose verbosity follows the broker's debug toggle.
pub const BROKER_TARGETS: &[&str] = &[
    "enface",
    "enface_core",
    "enface_broker",
    "enface_server",
    "enface_settings",
];

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "enface_broker" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::WARN,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Warn-level everywhere; broker crates drop to debug when `debug` is set.
    pub fn for_broker(debug: bool, json: bool) -> Self {
        let module_levels = if debug {
            BROKER_TARGETS
                .iter()
                .map(|t| ((*t).to_string(), Level::DEBUG))
                .collect()
        } else {
            Vec::new()
        };
        Self {
            log_level: Level::WARN,
            module_levels,
            json,
        }
    }

    /// Directive string handed to [`EnvFilter`] when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Install the global subscriber. Call once at startup; a second call
/// returns an error and leaves the first subscriber in place.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_by_default() {
        let config = TelemetryConfig::for_broker(false, false);
        assert_eq!(config.filter_directives(), "warn");
    }

    #[test]
    fn debug_raises_broker_targets_only() {
        let config = TelemetryConfig::for_broker(true, true);
        let directives = config.filter_directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("enface_broker=debug"));
        assert!(directives.contains("enface_server=debug"));
        assert!(config.json);
    }

    #[test]
    fn directives_parse_as_env_filter() {
        let config = TelemetryConfig::for_broker(true, false);
        assert!(EnvFilter::try_new(config.filter_directives()).is_ok());
    }

    #[test]
    fn second_init_is_rejected() {
        let config = TelemetryConfig::default();
        let first = init_telemetry(&config);
        let second = init_telemetry(&config);
        // Only this test installs a subscriber in this binary.
        assert!(first.is_ok());
        assert!(second.is_err());
    }
}
