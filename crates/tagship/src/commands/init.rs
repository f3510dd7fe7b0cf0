//! Initialize command.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tagship_config::{CONFIG_FILE_NAME, Config};
use tracing::info;

use super::BackendArg;

/// Arguments for the init command.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Directory to write the configuration to
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Repository as owner/name
    #[arg(long)]
    pub repository: Option<String>,

    /// Publish backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,
}

/// Runs the init command.
pub fn run(args: InitArgs) -> Result<()> {
    let path = args.dir.join(CONFIG_FILE_NAME);
    if path.exists() && !args.force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    config.repository.name = args.repository;
    if let Some(backend) = args.backend {
        config.repository.backend = backend.into();
    }
    config.validate().context("invalid configuration")?;

    let content = config.to_toml()?;
    fs::write(&path, content).with_context(|| format!("failed to write {}", path.display()))?;

    info!(path = %path.display(), "configuration written");
    println!("Created {}", path.display());
    Ok(())
}
