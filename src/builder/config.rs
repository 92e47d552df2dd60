//! Build configuration.
//!
//! Defaults are sensible for local development; every knob can be overridden
//! through `PIPEFORGE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::sandbox::SandboxStrategy;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the synthesis controller and its components.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    // Filesystem layout
    /// Root directory of input data files.
    pub data_root: PathBuf,
    /// Root directory for per-pipeline output and attempt workspaces.
    pub pipelines_root: PathBuf,

    // Retry loop
    /// Maximum generation+sandbox attempts per build.
    pub max_attempts: u32,

    // Source probing
    /// Preview row cap.
    pub preview_rows: usize,

    // Sandbox settings
    /// Isolation strategy for attempts.
    pub sandbox_strategy: SandboxStrategy,
    /// Container image for the docker strategy.
    pub docker_image: String,
    /// Deadline for the execution and test phases.
    pub exec_timeout: Duration,
    /// Deadline for environment creation and dependency install.
    pub install_timeout: Duration,

    // LLM settings
    /// Model for both synthesis stages; empty selects the provider default.
    pub model: String,
    /// Temperature for both synthesis stages.
    pub temperature: f64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("./data"),
            pipelines_root: PathBuf::from("./pipelines"),
            max_attempts: 4,
            preview_rows: 20,
            sandbox_strategy: SandboxStrategy::Venv,
            docker_image: "python:3.11-slim".to_string(),
            exec_timeout: Duration::from_secs(300),
            install_timeout: Duration::from_secs(600),
            model: String::new(),
            temperature: 0.0,
        }
    }
}

impl BuildConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PIPEFORGE_DATA_ROOT`: input data directory (default: ./data)
    /// - `PIPEFORGE_PIPELINES_ROOT`: output directory (default: ./pipelines)
    /// - `PIPEFORGE_MAX_ATTEMPTS`: retry budget (default: 4)
    /// - `PIPEFORGE_PREVIEW_ROWS`: preview row cap (default: 20)
    /// - `PIPEFORGE_SANDBOX`: "venv" or "docker" (default: venv)
    /// - `PIPEFORGE_DOCKER_IMAGE`: container image (default: python:3.11-slim)
    /// - `PIPEFORGE_EXEC_TIMEOUT_SECS`: run/test deadline (default: 300)
    /// - `PIPEFORGE_INSTALL_TIMEOUT_SECS`: setup deadline (default: 600)
    /// - `PIPEFORGE_MODEL`: model override (default: provider default)
    /// - `PIPEFORGE_TEMPERATURE`: sampling temperature (default: 0.0)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PIPEFORGE_DATA_ROOT") {
            config.data_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PIPEFORGE_PIPELINES_ROOT") {
            config.pipelines_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PIPEFORGE_MAX_ATTEMPTS") {
            config.max_attempts = parse_env_value(&val, "PIPEFORGE_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("PIPEFORGE_PREVIEW_ROWS") {
            config.preview_rows = parse_env_value(&val, "PIPEFORGE_PREVIEW_ROWS")?;
        }
        if let Ok(val) = std::env::var("PIPEFORGE_SANDBOX") {
            config.sandbox_strategy =
                val.parse()
                    .map_err(|message: String| ConfigError::InvalidValue {
                        key: "PIPEFORGE_SANDBOX".to_string(),
                        message,
                    })?;
        }
        if let Ok(val) = std::env::var("PIPEFORGE_DOCKER_IMAGE") {
            config.docker_image = val;
        }
        if let Ok(val) = std::env::var("PIPEFORGE_EXEC_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPEFORGE_EXEC_TIMEOUT_SECS")?;
            config.exec_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("PIPEFORGE_INSTALL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPEFORGE_INSTALL_TIMEOUT_SECS")?;
            config.install_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("PIPEFORGE_MODEL") {
            config.model = val;
        }
        if let Ok(val) = std::env::var("PIPEFORGE_TEMPERATURE") {
            config.temperature = parse_env_value(&val, "PIPEFORGE_TEMPERATURE")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.preview_rows == 0 {
            return Err(ConfigError::ValidationFailed(
                "preview_rows must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(format!(
                "temperature must be in [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BuildConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.preview_rows, 20);
        assert_eq!(config.sandbox_strategy, SandboxStrategy::Venv);
    }

    #[test]
    fn zero_attempts_fails_validation() {
        let config = BuildConfig {
            max_attempts: 0,
            ..BuildConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn out_of_range_temperature_fails_validation() {
        let config = BuildConfig {
            temperature: 3.5,
            ..BuildConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_env_value_reports_key() {
        let err = parse_env_value::<u32>("not-a-number", "PIPEFORGE_MAX_ATTEMPTS").unwrap_err();
        assert!(err.to_string().contains("PIPEFORGE_MAX_ATTEMPTS"));
    }
}
