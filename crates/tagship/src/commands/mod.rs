//! Subcommands and the flags they share.

pub mod init;
pub mod notes;
pub mod release;
pub mod resolve;
pub mod retag;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tagship_config::{
    Backend, ChangelogSource, Config, RemoteTarget, find_and_load_config, load_config,
};
use tagship_git::{GithubStore, HEADS_NAMESPACE, LocalStore, Remote};
use tracing::{debug, warn};

/// Backend argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// GitHub REST API
    Github,
    /// Git repository on disk
    Local,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Github => Backend::Github,
            BackendArg::Local => Backend::Local,
        }
    }
}

/// Changelog source argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    /// The working directory
    Local,
    /// The tip of the target branch
    Remote,
}

impl From<SourceArg> for ChangelogSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Local => ChangelogSource::Local,
            SourceArg::Remote => ChangelogSource::Remote,
        }
    }
}

/// Flags identifying the repository to release.
#[derive(Debug, Clone, Default, Args)]
pub struct RemoteArgs {
    /// Repository as owner/name
    #[arg(long, env = "GITHUB_REPOSITORY")]
    pub repository: Option<String>,

    /// API token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Branch to release from
    #[arg(long = "ref", env = "GITHUB_REF", value_name = "REF")]
    pub reference: Option<String>,

    /// Publish backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Repository path for the local backend
    #[arg(long)]
    pub repository_path: Option<PathBuf>,
}

impl RemoteArgs {
    /// Applies the flags over the configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(repository) = &self.repository {
            config.repository.name = Some(repository.clone());
        }
        if let Some(reference) = &self.reference {
            // GITHUB_REF points at a tag on tag pushes; only branches qualify.
            if reference.starts_with("refs/") && !reference.starts_with(HEADS_NAMESPACE) {
                warn!(%reference, "ignoring ref that is not a branch");
            } else {
                config.repository.reference.clone_from(reference);
            }
        }
        if let Some(backend) = self.backend {
            config.repository.backend = backend.into();
        }
        if let Some(path) = &self.repository_path {
            config.repository.path = Some(path.clone());
            if self.backend.is_none() {
                config.repository.backend = Backend::Local;
            }
        }
    }

    /// Opens the configured backend.
    pub fn open(&self, config: &Config) -> Result<Box<dyn Remote>> {
        open_remote(config.remote_target(self.token.as_deref())?)
    }
}

/// Flags locating the working copy files.
#[derive(Debug, Clone, Default, Args)]
pub struct ChangelogArgs {
    /// Changelog file, relative to the working directory
    #[arg(long)]
    pub changelog: Option<PathBuf>,

    /// Where the changelog is read from
    #[arg(long, value_enum)]
    pub changelog_source: Option<SourceArg>,

    /// Directory the changelog and files are resolved against
    #[arg(short = 'C', long)]
    pub working_directory: Option<PathBuf>,
}

impl ChangelogArgs {
    /// Applies the flags over the configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(changelog) = &self.changelog {
            config.changelog.file.clone_from(changelog);
        }
        if let Some(source) = self.changelog_source {
            config.changelog.source = source.into();
        }
        if let Some(dir) = &self.working_directory {
            config.publish.working_directory.clone_from(dir);
        }
    }
}

/// Loads the configuration file, or the defaults when there is none.
pub fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => find_and_load_config().context("failed to load configuration"),
    }
}

/// Validates the configuration once every override is applied.
pub fn finish(config: Config) -> Result<Config> {
    config.validate().context("invalid configuration")?;
    debug!(?config, "effective configuration");
    Ok(config)
}

/// Connects to the backend described by `target`.
pub fn open_remote(target: RemoteTarget) -> Result<Box<dyn Remote>> {
    match target {
        RemoteTarget::Github {
            repository,
            token,
            api_url,
        } => {
            debug!(%repository, %api_url, "using GitHub backend");
            let store = GithubStore::builder(repository, token)
                .api_url(api_url)
                .build()
                .context("failed to create GitHub client")?;
            Ok(Box::new(store))
        }
        RemoteTarget::Local { path } => {
            debug!(?path, "using local backend");
            let store = LocalStore::open(&path)
                .with_context(|| format!("failed to open repository {}", path.display()))?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_args_override_config() {
        let mut config = Config::default();
        let args = RemoteArgs {
            repository: Some("acme/widgets".to_string()),
            reference: Some("refs/heads/release".to_string()),
            ..RemoteArgs::default()
        };

        args.apply(&mut config);

        assert_eq!(config.repository.name.as_deref(), Some("acme/widgets"));
        assert_eq!(config.repository.reference, "refs/heads/release");
        assert_eq!(config.repository.backend, Backend::Github);
    }

    #[test]
    fn test_tag_refs_are_ignored() {
        let mut config = Config::default();
        let args = RemoteArgs {
            reference: Some("refs/tags/v1.0.0".to_string()),
            ..RemoteArgs::default()
        };

        args.apply(&mut config);

        assert_eq!(config.repository.reference, "refs/heads/main");
    }

    #[test]
    fn test_repository_path_selects_local_backend() {
        let mut config = Config::default();
        let args = RemoteArgs {
            repository_path: Some(PathBuf::from("/srv/app.git")),
            ..RemoteArgs::default()
        };

        args.apply(&mut config);

        assert_eq!(config.repository.backend, Backend::Local);
        assert_eq!(
            config.remote_target(None).unwrap(),
            RemoteTarget::Local {
                path: PathBuf::from("/srv/app.git")
            }
        );
    }

    #[test]
    fn test_github_without_token() {
        let mut config = Config::default();
        RemoteArgs {
            repository: Some("acme/widgets".to_string()),
            ..RemoteArgs::default()
        }
        .apply(&mut config);

        let err = RemoteArgs::default().open(&config).err().unwrap();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }

    #[test]
    fn test_open_local_not_a_repo() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = open_remote(RemoteTarget::Local {
            path: temp_dir.path().to_path_buf(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_changelog_args_override_config() {
        let mut config = Config::default();
        ChangelogArgs {
            changelog: Some(PathBuf::from("docs/CHANGES.md")),
            changelog_source: Some(SourceArg::Remote),
            working_directory: Some(PathBuf::from("/work")),
        }
        .apply(&mut config);

        assert_eq!(config.changelog.file, PathBuf::from("docs/CHANGES.md"));
        assert_eq!(config.changelog.source, ChangelogSource::Remote);
        assert_eq!(config.publish.working_directory, PathBuf::from("/work"));
    }
}
