//! CLI definition.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;

/// Resolve the next version, roll the changelog and publish a tagged release.
#[derive(Debug, Parser)]
#[command(name = "tagship")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: tagship.toml in the current or a parent directory)
    #[arg(short, long, global = true, env = "TAGSHIP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a default tagship.toml
    Init(commands::init::InitArgs),

    /// Print the next version without changing anything
    Resolve(commands::resolve::ResolveArgs),

    /// Roll the changelog and publish the release
    Release(commands::release::ReleaseArgs),

    /// Print the changelog notes of a version
    Notes(commands::notes::NotesArgs),

    /// Tag a release commit left untagged by an interrupted publish
    Retag(commands::retag::RetagArgs),
}

impl Cli {
    /// Runs the CLI command.
    pub fn run(self) -> Result<()> {
        let config = self.config.as_deref();
        match self.command {
            Commands::Init(args) => commands::init::run(args),
            Commands::Resolve(args) => commands::resolve::run(args, config),
            Commands::Release(args) => commands::release::run(args, config),
            Commands::Notes(args) => commands::notes::run(args, config),
            Commands::Retag(args) => commands::retag::run(args, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tagship", "resolve", "patch", "--verbose", "-c", "x.toml"])
            .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Resolve(_)));
    }
}
