//! Resolve command.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tagship_core::{ReleaseManager, VersionRequest};
use tracing::info;

use super::RemoteArgs;
use crate::output::{OutputFormat, Outputs};

/// Arguments for the resolve command.
#[derive(Debug, Args)]
pub struct ResolveArgs {
    /// Explicit version (1.2.3, v1.2.3) or bump action (major, premajor,
    /// minor, preminor, patch, prepatch, prerelease)
    #[arg(value_name = "VERSION", env = "TAGSHIP_VERSION")]
    pub request: VersionRequest,

    /// Pre-release identifier for pre* bumps
    #[arg(long)]
    pub pre_id: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

/// Runs the resolve command.
pub fn run(args: ResolveArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load(config_path)?;
    args.remote.apply(&mut config);
    if args.pre_id.is_some() {
        config.version.pre_id.clone_from(&args.pre_id);
    }
    let config = super::finish(config)?;

    let remote = args.remote.open(&config)?;
    let resolution = ReleaseManager::new(remote.as_ref(), &config)
        .resolve(&args.request)
        .with_context(|| format!("failed to resolve version {}", args.request))?;

    info!(
        version = %resolution.version,
        tag = %resolution.tag,
        previous = %resolution.previous_tag,
        "version resolved"
    );
    Outputs::from_resolution(&resolution).emit(args.format)
}
