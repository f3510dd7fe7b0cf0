//! Notes command.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tagship_config::ChangelogSource;
use tagship_core::{ChangelogEngine, FsChangelogStore, ReleaseManager};

use super::{ChangelogArgs, RemoteArgs};

/// Arguments for the notes command.
#[derive(Debug, Args)]
pub struct NotesArgs {
    /// Released version to print (default: the unreleased section)
    #[arg(value_name = "VERSION")]
    pub version: Option<String>,

    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(flatten)]
    pub changelog: ChangelogArgs,
}

/// Runs the notes command.
pub fn run(args: NotesArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load(config_path)?;
    args.remote.apply(&mut config);
    args.changelog.apply(&mut config);
    let config = super::finish(config)?;

    let version = args.version.as_deref();
    let section = version.unwrap_or("Unreleased");

    let notes = match config.changelog.source {
        ChangelogSource::Local => {
            let path = config
                .publish
                .working_directory
                .join(&config.changelog.file);
            ChangelogEngine::read(
                &FsChangelogStore,
                &path,
                config.changelog.require_unreleased,
            )
            .and_then(|mut engine| engine.release_notes(version))
            .with_context(|| format!("no notes for {section} in {}", path.display()))?
        }
        ChangelogSource::Remote => {
            let remote = args.remote.open(&config)?;
            ReleaseManager::new(remote.as_ref(), &config)
                .notes(version)
                .with_context(|| format!("no notes for {section} on the remote changelog"))?
        }
    };

    println!("{notes}");
    Ok(())
}
