//! Service configuration.
//!
//! Resolved once from the environment into immutable values that are
//! passed to the service, the token validator and the listener.

use gridbase_core::config::{env_or, env_parse, resolve_secret};
use gridbase_core::ConfigError;
use secrecy::SecretString;
use std::time::Duration;

/// Message broker connection settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    /// Queue consumed by this instance.
    pub queue_name: String,
    /// Delay between connection attempts.
    pub retry_delay: Duration,
}

impl TransportConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Settings of one service instance, which serves exactly one database.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_name: String,
    pub jwt_secret: SecretString,
    pub token_lifetime: Duration,
    pub transport: TransportConfig,
}

/// Queue consumed by the instance serving `db_name`.
pub fn queue_name(db_name: &str) -> String {
    format!("grid_service_{}", db_name.to_lowercase())
}

impl ServiceConfig {
    pub fn from_env(db_name: &str) -> Result<Self, ConfigError> {
        let jwt_secret_file = env_or(
            &format!("JWT_SECRET_FILE_{}", db_name),
            "/run/secrets/jwt-secret",
        );
        let broker_password_file = env_or("RABBITMQ_PASSWORD_FILE", "/run/secrets/rabbitmq-password");
        let token_lifetime_secs: u64 = env_parse(&format!("JWT_LIFETIME_SECONDS_{}", db_name), 86_400)?;
        let retry_delay_ms: u64 = env_parse("RABBITMQ_RETRY_DELAY_MILLISECONDS", 5000)?;

        Ok(Self {
            db_name: db_name.to_string(),
            jwt_secret: resolve_secret(&format!("JWT_SECRET_{}", db_name), &jwt_secret_file)?,
            token_lifetime: Duration::from_secs(token_lifetime_secs),
            transport: TransportConfig {
                host: env_or("RABBITMQ_HOST", "rabbitmq"),
                port: env_parse("RABBITMQ_PORT", 5672)?,
                user: env_or("RABBITMQ_USER", "guest"),
                password: resolve_secret(
                    &format!("RABBITMQ_PASSWORD_{}", db_name),
                    &broker_password_file,
                )?,
                queue_name: queue_name(db_name),
                retry_delay: Duration::from_millis(retry_delay_ms),
            },
        })
    }
}

/// Telemetry settings.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
}

impl TelemetryConfig {
    pub fn from_env() -> Self {
        Self {
            service_name: env_or("GRIDBASE_SERVICE_NAME", "gridbase-service"),
            service_version: env_or("GRIDBASE_SERVICE_VERSION", env!("CARGO_PKG_VERSION")),
            environment: env_or("GRIDBASE_ENVIRONMENT", "development"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_queue_name_is_lowercased() {
        assert_eq!(queue_name("GridBase_Test"), "grid_service_gridbase_test");
    }

    #[test]
    fn test_from_env() -> Result<(), ConfigError> {
        std::env::set_var("JWT_SECRET_svc_unit", "jwt");
        std::env::set_var("RABBITMQ_PASSWORD_svc_unit", "mq");
        let config = ServiceConfig::from_env("svc_unit")?;
        assert_eq!(config.jwt_secret.expose_secret(), "jwt");
        assert_eq!(config.transport.queue_name, "grid_service_svc_unit");
        assert_eq!(config.transport.retry_delay, Duration::from_secs(5));
        assert_eq!(config.transport.password.expose_secret(), "mq");
        std::env::remove_var("JWT_SECRET_svc_unit");
        std::env::remove_var("RABBITMQ_PASSWORD_svc_unit");
        Ok(())
    }

    #[test]
    fn test_missing_jwt_secret() {
        std::env::set_var("JWT_SECRET_FILE_svc_missing", "/nonexistent/jwt");
        let result = ServiceConfig::from_env("svc_missing");
        assert!(matches!(result, Err(ConfigError::MissingSecret { .. })));
        std::env::remove_var("JWT_SECRET_FILE_svc_missing");
    }
}
