//! Centralized configuration (environment variables + defaults).
//!
//! Everything is read once at start-up. Call `dotenv::dotenv().ok()` before these.

use crate::domain::policy::{FieldPolicy, DEFAULT_TEMPORAL_FIELDS};
use crate::error::ConfigError;
use crate::infra::connection::{ConnectionConfig, LogVerbosity};

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(var)),
    }
}

/// Splits a comma separated list, dropping blanks.
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Database host as `host[:port][/database]` (required).
pub fn database_host() -> Result<String, ConfigError> {
    required("DATABASE_HOST")
}

pub fn database_username() -> Result<String, ConfigError> {
    required("DATABASE_USERNAME")
}

pub fn database_password() -> Result<String, ConfigError> {
    required("DATABASE_PASSWORD")
}

/// Driver log categories, e.g. `query,warn,error`. Defaults to `warn,error`.
pub fn database_log_level() -> Result<LogVerbosity, ConfigError> {
    match std::env::var("DATABASE_LOG_LEVEL") {
        Ok(raw) if !raw.trim().is_empty() => raw.parse(),
        _ => Ok(LogVerbosity::default()),
    }
}

/// Models whose deletes become `delFlag` updates. Empty unless configured.
pub fn soft_delete_models() -> Vec<String> {
    std::env::var("SOFT_DELETE_MODELS")
        .map(|raw| parse_list(&raw))
        .unwrap_or_default()
}

pub fn temporal_fields() -> Vec<String> {
    match std::env::var("TEMPORAL_FIELDS") {
        Ok(raw) if !raw.trim().is_empty() => parse_list(&raw),
        _ => DEFAULT_TEMPORAL_FIELDS.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn listen_addr() -> String {
    std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
}

pub fn connection_config() -> Result<ConnectionConfig, ConfigError> {
    ConnectionConfig::new(
        &database_host()?,
        database_username()?,
        database_password()?,
        database_log_level()?,
    )
}

pub fn field_policy() -> FieldPolicy {
    FieldPolicy::new(soft_delete_models(), temporal_fields())
}
