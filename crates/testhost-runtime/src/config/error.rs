//! Configuration errors.

use std::path::PathBuf;
use testhost_types::ErrorCode;
use thiserror::Error;

/// Configuration error type.
///
/// Every variant is a configuration error: fatal at startup, reported
/// before any session is created.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },

    /// A merged value is out of range.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Creates a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse TOML error.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid env var error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ErrorCode for ConfigError {
    fn code(&self) -> &'static str {
        match self {
            Self::ReadFile { .. } => "CONFIG_READ_FILE",
            Self::ParseToml { .. } => "CONFIG_PARSE_TOML",
            Self::InvalidEnvVar { .. } => "CONFIG_INVALID_ENV_VAR",
            Self::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testhost_types::assert_error_codes;

    #[test]
    fn error_display() {
        let err = ConfigError::invalid_env_var("TESTHOST_DEBUG", "expected bool");
        assert!(err.to_string().contains("TESTHOST_DEBUG"));
        assert!(err.to_string().contains("expected bool"));
    }

    #[test]
    fn all_error_codes_valid() {
        let parse_err = match toml::from_str::<toml::Value>("= broken") {
            Err(e) => e,
            Ok(_) => panic!("expected a TOML parse error"),
        };
        let variants = vec![
            ConfigError::read_file("a", std::io::Error::other("x")),
            ConfigError::parse_toml("a", parse_err),
            ConfigError::invalid_env_var("A", "x"),
            ConfigError::invalid_value("execution.parallelism", "must be >= 1"),
        ];
        assert_error_codes(&variants, "CONFIG_");
    }
}
