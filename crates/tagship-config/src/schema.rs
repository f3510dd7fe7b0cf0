//! Configuration schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ConfigResult};

/// Default GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Repository the release is published to.
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Version resolution.
    #[serde(default)]
    pub version: VersionConfig,

    /// Changelog handling.
    #[serde(default)]
    pub changelog: ChangelogConfig,

    /// Publishing.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// Where release objects are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// GitHub REST API.
    #[default]
    Github,
    /// Repository on the local filesystem (e.g., a bare mirror).
    Local,
}

/// Repository configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Backend kind.
    #[serde(default)]
    pub backend: Backend,

    /// `owner/repo` slug (GitHub backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Repository path (local backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Branch the release commit is pushed to.
    #[serde(rename = "ref", default = "default_ref")]
    pub reference: String,

    /// API endpoint (GitHub backend).
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            name: None,
            path: None,
            reference: default_ref(),
            api_url: default_api_url(),
        }
    }
}

fn default_ref() -> String {
    "refs/heads/main".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// Version configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConfig {
    /// Version used as the baseline when no release tag exists.
    #[serde(default = "default_seed")]
    pub seed: String,

    /// Pre-release identifier (e.g., "beta" for `1.0.0-beta.0`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_id: Option<String>,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            pre_id: None,
        }
    }
}

fn default_seed() -> String {
    "0.0.1".to_string()
}

/// Where the changelog is read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangelogSource {
    /// The working directory.
    #[default]
    Local,
    /// The tip of the target branch.
    Remote,
}

/// Changelog configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangelogConfig {
    /// Changelog path, relative to the working directory and to the repository root.
    #[serde(default = "default_changelog_file")]
    pub file: PathBuf,

    /// Where the current changelog is read from.
    #[serde(default)]
    pub source: ChangelogSource,

    /// Fail instead of inserting a missing unreleased section.
    #[serde(default)]
    pub require_unreleased: bool,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            file: default_changelog_file(),
            source: ChangelogSource::default(),
            require_unreleased: false,
        }
    }
}

fn default_changelog_file() -> PathBuf {
    PathBuf::from("CHANGELOG.md")
}

/// Release commit author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorConfig {
    /// Author name.
    pub name: String,
    /// Author email.
    pub email: String,
}

/// Publish configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Push the release commit and tag.
    #[serde(default)]
    pub push: bool,

    /// Directory the updated changelog is written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<PathBuf>,

    /// Glob patterns of additional files to publish.
    #[serde(default)]
    pub files: Vec<String>,

    /// Directory patterns are resolved against.
    #[serde(default = "default_working_directory")]
    pub working_directory: PathBuf,

    /// Attempts when the branch moves during publishing.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Check the written tree before moving the branch.
    #[serde(default = "default_true")]
    pub verify_tree: bool,

    /// Release commit author; the backend identity is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorConfig>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            push: false,
            dist: None,
            files: Vec::new(),
            working_directory: default_working_directory(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            verify_tree: true,
            author: None,
        }
    }
}

fn default_working_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_attempts() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

/// A fully identified publish target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteTarget {
    /// A GitHub repository.
    Github {
        /// `owner/repo` slug.
        repository: String,
        /// API token.
        token: String,
        /// API endpoint.
        api_url: String,
    },
    /// A repository on disk.
    Local {
        /// Repository path.
        path: PathBuf,
    },
}

impl Config {
    /// Checks values that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.publish.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "publish.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.repository.reference.starts_with("refs/tags/") {
            return Err(ConfigError::Invalid(format!(
                "repository.ref must be a branch, got {}",
                self.repository.reference
            )));
        }

        if self.version.seed.trim().is_empty() {
            return Err(ConfigError::Invalid("version.seed is empty".to_string()));
        }

        if let Some(pre_id) = &self.version.pre_id
            && pre_id.trim().is_empty()
        {
            return Err(ConfigError::Invalid("version.pre_id is empty".to_string()));
        }

        if let Some(author) = &self.publish.author
            && (author.name.trim().is_empty() || author.email.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "publish.author needs a name and an email".to_string(),
            ));
        }

        if let Some(name) = &self.repository.name {
            validate_slug(name)?;
        }

        Ok(())
    }

    /// Resolves the publish target, using `token` for the GitHub backend.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRepository`] if the repository is not
    /// identified, and [`ConfigError::MissingCredential`] if the GitHub
    /// backend has no token.
    pub fn remote_target(&self, token: Option<&str>) -> ConfigResult<RemoteTarget> {
        match self.repository.backend {
            Backend::Github => {
                let repository = self
                    .repository
                    .name
                    .as_deref()
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::MissingRepository(
                            "set repository.name, GITHUB_REPOSITORY or --repository".to_string(),
                        )
                    })?;
                validate_slug(repository)?;

                let token = token
                    .filter(|token| !token.trim().is_empty())
                    .ok_or_else(|| {
                        ConfigError::MissingCredential(
                            "set GITHUB_TOKEN or pass --token".to_string(),
                        )
                    })?;

                Ok(RemoteTarget::Github {
                    repository: repository.to_string(),
                    token: token.to_string(),
                    api_url: self.repository.api_url.clone(),
                })
            }
            Backend::Local => {
                let path = self.repository.path.clone().ok_or_else(|| {
                    ConfigError::MissingRepository(
                        "set repository.path or --repository-path for the local backend"
                            .to_string(),
                    )
                })?;
                Ok(RemoteTarget::Local { path })
            }
        }
    }

    /// Serializes the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn validate_slug(name: &str) -> ConfigResult<()> {
    match name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
            Ok(())
        }
        _ => Err(ConfigError::Invalid(format!(
            "repository.name must be owner/repo, got {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.repository.backend, Backend::Github);
        assert_eq!(config.repository.reference, "refs/heads/main");
        assert_eq!(config.repository.api_url, "https://api.github.com");
        assert_eq!(config.version.seed, "0.0.1");
        assert_eq!(config.changelog.file, PathBuf::from("CHANGELOG.md"));
        assert_eq!(config.changelog.source, ChangelogSource::Local);
        assert!(!config.changelog.require_unreleased);
        assert!(!config.publish.push);
        assert_eq!(config.publish.max_attempts, 1);
        assert_eq!(config.publish.retry_backoff_ms, 500);
        assert!(config.publish.verify_tree);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full() {
        let config: Config = toml::from_str(
            r#"
            [repository]
            backend = "local"
            path = "/srv/mirror.git"
            ref = "refs/heads/release"

            [version]
            seed = "1.0.0"
            pre_id = "beta"

            [changelog]
            file = "docs/CHANGELOG.md"
            source = "remote"
            require_unreleased = true

            [publish]
            push = true
            dist = "dist"
            files = ["dist/*.js", "dist/*.map"]
            max_attempts = 3
            retry_backoff_ms = 100
            verify_tree = false
            author = { name = "Release Bot", email = "bot@example.com" }
        "#,
        )
        .unwrap();

        assert_eq!(config.repository.backend, Backend::Local);
        assert_eq!(config.repository.reference, "refs/heads/release");
        assert_eq!(config.version.pre_id.as_deref(), Some("beta"));
        assert_eq!(config.changelog.source, ChangelogSource::Remote);
        assert!(config.changelog.require_unreleased);
        assert_eq!(config.publish.files.len(), 2);
        assert_eq!(config.publish.dist, Some(PathBuf::from("dist")));
        assert_eq!(config.publish.max_attempts, 3);
        assert!(!config.publish.verify_tree);
        assert_eq!(config.publish.author.unwrap().name, "Release Bot");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let result: Result<Config, _> = toml::from_str("[repository]\nbackend = \"gitlab\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_max_attempts() {
        let mut config = Config::default();
        config.publish.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_tag_ref() {
        let mut config = Config::default();
        config.repository.reference = "refs/tags/v1.0.0".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_repository_slug() {
        let mut config = Config::default();
        config.repository.name = Some("no-slash".to_string());
        assert!(config.validate().is_err());

        config.repository.name = Some("owner/repo".to_string());
        assert!(config.validate().is_ok());

        config.repository.name = Some("a/b/c".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_author() {
        let mut config = Config::default();
        config.publish.author = Some(AuthorConfig {
            name: String::new(),
            email: "bot@example.com".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_target_github() {
        let mut config = Config::default();
        config.repository.name = Some("acme/widgets".to_string());

        let target = config.remote_target(Some("secret")).unwrap();
        assert_eq!(
            target,
            RemoteTarget::Github {
                repository: "acme/widgets".to_string(),
                token: "secret".to_string(),
                api_url: DEFAULT_API_URL.to_string(),
            }
        );
    }

    #[test]
    fn test_remote_target_missing_repository() {
        let config = Config::default();
        assert!(matches!(
            config.remote_target(Some("secret")),
            Err(ConfigError::MissingRepository(_))
        ));
    }

    #[test]
    fn test_remote_target_missing_token() {
        let mut config = Config::default();
        config.repository.name = Some("acme/widgets".to_string());
        assert!(matches!(
            config.remote_target(None),
            Err(ConfigError::MissingCredential(_))
        ));
        assert!(matches!(
            config.remote_target(Some("  ")),
            Err(ConfigError::MissingCredential(_))
        ));
    }

    #[test]
    fn test_remote_target_local() {
        let mut config = Config::default();
        config.repository.backend = Backend::Local;
        assert!(matches!(
            config.remote_target(None),
            Err(ConfigError::MissingRepository(_))
        ));

        config.repository.path = Some(PathBuf::from("/srv/mirror.git"));
        assert_eq!(
            config.remote_target(None).unwrap(),
            RemoteTarget::Local {
                path: PathBuf::from("/srv/mirror.git")
            }
        );
    }

    #[test]
    fn test_to_toml_parses_back() {
        let mut config = Config::default();
        config.repository.name = Some("acme/widgets".to_string());
        config.publish.files = vec!["dist/*".to_string()];

        let text = config.to_toml().unwrap();
        assert!(text.contains("[repository]"));
        assert!(text.contains("ref = \"refs/heads/main\""));

        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
