//! Tracing subscriber initialization.
//!
//! Library code only emits `tracing` events. Binaries embedding the engine
//! call [`init_tracing`] once at startup to install a subscriber.

use strata_core::{StrataError, StrataResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `STRATA_LOG_FILTER` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_FILTER: &str = "strata=info,audit=info,warn";

/// Output format of the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Human-readable multi-line output
    Pretty,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Self::Pretty,
            _ => Self::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Environment (production, staging, development)
    pub environment: String,
    pub format: LogFormat,
    /// `EnvFilter` directives; `None` falls back to `RUST_LOG`, then the default
    pub filter: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "strata".to_string(),
            environment: "development".to_string(),
            format: LogFormat::Json,
            filter: None,
        }
    }
}

impl TelemetryConfig {
    /// Read `STRATA_SERVICE_NAME`, `STRATA_ENVIRONMENT`, `STRATA_LOG_FORMAT`
    /// (`json` or `pretty`) and `STRATA_LOG_FILTER`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("STRATA_SERVICE_NAME").unwrap_or(defaults.service_name),
            environment: std::env::var("STRATA_ENVIRONMENT").unwrap_or(defaults.environment),
            format: std::env::var("STRATA_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            filter: std::env::var("STRATA_LOG_FILTER").ok().filter(|s| !s.trim().is_empty()),
        }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::new(directives),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        }
    }
}

/// Install the global subscriber.
///
/// Fails instead of panicking if a subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> StrataResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let installed = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    installed.map_err(|e| StrataError::internal(format!("Failed to init subscriber: {e}")))?;

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.environment,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(" TEXT "), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("anything"), LogFormat::Json);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = TelemetryConfig {
            filter: Some("off".to_string()),
            ..TelemetryConfig::default()
        };
        // The first call may lose to another test in this binary.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
