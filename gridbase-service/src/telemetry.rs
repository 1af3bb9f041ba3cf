//! Tracing subscriber setup.

use crate::config::TelemetryConfig;
use gridbase_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "gridbase_service=debug,gridbase_storage=debug,info";

/// Install the global JSON subscriber. Call once at startup.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            field: "tracing subscriber".to_string(),
            value: config.service_name.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!(
        service_name = %config.service_name,
        service_version = %config.service_version,
        environment = %config.environment,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig::from_env();
        let first = init_tracing(&config);
        let second = init_tracing(&config);
        // another test may have installed the subscriber first
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
