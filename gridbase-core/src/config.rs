//! Configuration resolution helpers
//!
//! Settings are resolved once into immutable values and injected at
//! construction. Secrets come from an environment variable when it is set,
//! otherwise from a mounted secret file.

use crate::error::ConfigError;
use secrecy::SecretString;
use std::path::Path;
use std::str::FromStr;

/// Resolve a secret from `env_var`, falling back to the trimmed content of `file_path`.
pub fn resolve_secret(env_var: &str, file_path: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Ok(SecretString::new(value.into()));
        }
    }
    read_secret_file(file_path).ok_or_else(|| ConfigError::MissingSecret {
        env_var: env_var.to_string(),
        file_path: file_path.to_string(),
    })
}

fn read_secret_file(file_path: &str) -> Option<SecretString> {
    if file_path.is_empty() || !Path::new(file_path).is_file() {
        return None;
    }
    std::fs::read_to_string(file_path)
        .ok()
        .map(|content| SecretString::new(content.trim().to_string().into()))
}

/// Read an environment variable or return `default`.
pub fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read and parse an environment variable, returning `default` when unset.
///
/// A value that is set but does not parse is a configuration error rather
/// than a silent fallback.
pub fn env_parse<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            field: name.to_string(),
            value,
            reason: format!("expected {}", std::any::type_name::<T>()),
        }),
        Err(_) => Ok(default),
    }
}
