//! Configuration error types.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {0}")]
    NotFound(std::path::PathBuf),

    /// Invalid TOML syntax.
    #[error("invalid TOML: {0}")]
    InvalidToml(#[from] toml::de::Error),

    /// Configuration could not be serialized.
    #[error("cannot serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No token to authenticate against the remote.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// No repository to publish to.
    #[error("missing repository: {0}")]
    MissingRepository(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_not_found_display() {
        let err = ConfigError::NotFound(PathBuf::from("/path/to/tagship.toml"));
        assert_eq!(
            err.to_string(),
            "configuration file not found: /path/to/tagship.toml"
        );
    }

    #[test]
    fn test_invalid_display() {
        let err = ConfigError::Invalid("publish.max_attempts must be at least 1".to_string());
        assert_eq!(
            err.to_string(),
            "invalid configuration: publish.max_attempts must be at least 1"
        );
    }

    #[test]
    fn test_missing_credential_display() {
        let err = ConfigError::MissingCredential("set GITHUB_TOKEN or pass --token".to_string());
        assert_eq!(
            err.to_string(),
            "missing credential: set GITHUB_TOKEN or pass --token"
        );
    }

    #[test]
    fn test_missing_repository_display() {
        let err = ConfigError::MissingRepository("repository.name is not set".to_string());
        assert_eq!(
            err.to_string(),
            "missing repository: repository.name is not set"
        );
    }

    #[test]
    fn test_error_is_debug() {
        let err = ConfigError::Invalid("test".to_string());
        let debug = format!("{err:?}");
        assert!(debug.contains("Invalid"));
    }
}
