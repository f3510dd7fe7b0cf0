//! Release command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Args;
use tagship_core::{ReleaseManager, VersionRequest};
use tracing::info;

use super::{ChangelogArgs, RemoteArgs};
use crate::output::{OutputFormat, Outputs};

/// Arguments for the release command.
#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Explicit version (1.2.3, v1.2.3) or bump action (major, premajor,
    /// minor, preminor, patch, prepatch, prerelease)
    #[arg(value_name = "VERSION", env = "TAGSHIP_VERSION")]
    pub request: VersionRequest,

    /// Publish the release commit and tag (otherwise only compute it)
    #[arg(long)]
    pub push: bool,

    /// Files to publish with the changelog; glob patterns, repeatable or
    /// newline separated
    #[arg(long = "files", value_name = "PATTERN")]
    pub files: Vec<String>,

    /// Directory the rewritten changelog is saved to
    #[arg(long)]
    pub dist: Option<PathBuf>,

    /// Pre-release identifier for pre* bumps
    #[arg(long)]
    pub pre_id: Option<String>,

    /// Release date written to the changelog (default: today, UTC)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<NaiveDate>,

    /// Fail when the changelog has no unreleased section
    #[arg(long)]
    pub require_unreleased: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(flatten)]
    pub changelog: ChangelogArgs,
}

/// Runs the release command.
pub fn run(args: ReleaseArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load(config_path)?;
    args.remote.apply(&mut config);
    args.changelog.apply(&mut config);
    if args.push {
        config.publish.push = true;
    }
    if !args.files.is_empty() {
        config.publish.files.clone_from(&args.files);
    }
    if args.dist.is_some() {
        config.publish.dist.clone_from(&args.dist);
    }
    if args.pre_id.is_some() {
        config.version.pre_id.clone_from(&args.pre_id);
    }
    if args.require_unreleased {
        config.changelog.require_unreleased = true;
    }
    let config = super::finish(config)?;

    let remote = args.remote.open(&config)?;
    let mut manager = ReleaseManager::new(remote.as_ref(), &config);
    if let Some(date) = args.date {
        manager = manager.with_date(date);
    }

    let outcome = manager
        .release(&args.request)
        .with_context(|| format!("release {} failed", args.request))?;

    match &outcome.receipt {
        Some(receipt) => info!(
            tag = %receipt.tag,
            commit = %receipt.commit,
            attempts = receipt.attempts,
            "release published"
        ),
        None => info!(
            tag = %outcome.resolution.tag,
            files = outcome.changes.len(),
            "release prepared, not pushed"
        ),
    }

    Outputs::from_resolution(&outcome.resolution)
        .with("release-notes", outcome.notes)
        .emit(args.format)
}
