//! Core error types.

use semver::Version;
use thiserror::Error;

use crate::ChangelogError;

/// Core-related errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Neither a semantic version nor a bump action.
    #[error("invalid version: {input:?} is neither a semantic version nor a bump action")]
    InvalidVersion { input: String },

    /// The requested version does not move forward.
    #[error("version {version} is not greater than the current version {current}")]
    VersionNotAdvancing { version: Version, current: Version },

    /// Invalid file pattern.
    #[error("invalid file pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Changelog error.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// Git error.
    #[error("git error: {0}")]
    Git(#[from] tagship_git::GitError),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(#[from] tagship_config::ConfigError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_version_display() {
        let err = CoreError::InvalidVersion {
            input: "banana".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid version: \"banana\" is neither a semantic version nor a bump action"
        );
    }

    #[test]
    fn test_version_not_advancing_display() {
        let err = CoreError::VersionNotAdvancing {
            version: Version::new(1, 2, 3),
            current: Version::new(1, 2, 3),
        };
        assert_eq!(
            err.to_string(),
            "version 1.2.3 is not greater than the current version 1.2.3"
        );
    }

    #[test]
    fn test_changelog_error_is_transparent() {
        let err = CoreError::from(ChangelogError::AlreadyReset);
        assert_eq!(err.to_string(), ChangelogError::AlreadyReset.to_string());
    }

    #[test]
    fn test_git_error_wraps() {
        let err = CoreError::from(tagship_git::GitError::TagAlreadyExists("v1.0.0".to_string()));
        assert_eq!(err.to_string(), "git error: tag already exists: v1.0.0");
    }
}
