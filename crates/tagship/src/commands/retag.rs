//! Retag command.
//!
//! Recovers from a publish that moved the branch but failed to create the
//! tag. The commit is checked to be the release commit of the tag before it
//! is tagged.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tagship_core::{ReleaseManager, TAG_PREFIX, collect_files};
use tagship_git::{FileChangeSet, ObjectId};
use tracing::info;

use super::RemoteArgs;
use crate::output::{OutputFormat, Outputs};

/// Arguments for the retag command.
#[derive(Debug, Args)]
pub struct RetagArgs {
    /// Tag to create (v1.2.3 or 1.2.3)
    pub tag: String,

    /// Release commit the tag points to, as a full 40 character id
    #[arg(value_parser = parse_commit)]
    pub commit: ObjectId,

    /// Files the release commit must contain with their current content;
    /// glob patterns, repeatable or newline separated
    #[arg(long = "verify", value_name = "PATTERN")]
    pub verify: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,

    #[command(flatten)]
    pub remote: RemoteArgs,
}

fn parse_commit(value: &str) -> Result<ObjectId, String> {
    let value = value.trim();
    if value.len() == 40 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(ObjectId::new(value))
    } else {
        Err(format!("expected a full 40 character commit id, got {value:?}"))
    }
}

/// Runs the retag command.
pub fn run(args: RetagArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = super::load(config_path)?;
    args.remote.apply(&mut config);
    let config = super::finish(config)?;

    let tag = if args.tag.starts_with(TAG_PREFIX) {
        args.tag.clone()
    } else {
        format!("{TAG_PREFIX}{}", args.tag)
    };
    let commit = args.commit;

    let expected = if args.verify.is_empty() {
        None
    } else {
        let mut changes = FileChangeSet::new();
        let count = collect_files(&config.publish.working_directory, &args.verify, &mut changes)
            .context("failed to collect files to verify")?;
        info!(files = count, "verifying release commit content");
        Some(changes)
    };

    let remote = args.remote.open(&config)?;
    let receipt = ReleaseManager::new(remote.as_ref(), &config)
        .resume(&tag, &commit, expected.as_ref())
        .with_context(|| format!("failed to tag {commit} as {tag}"))?;

    info!(tag = %receipt.tag, commit = %receipt.commit, "release tagged");
    Outputs::new()
        .with("tag", receipt.tag)
        .with("commit", receipt.commit.to_string())
        .emit(args.format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commit_full_id() {
        let id = parse_commit(" 0123456789ABCDEF0123456789abcdef01234567 ").unwrap();
        assert_eq!(id.as_str(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_parse_commit_rejects_abbreviated_id() {
        let err = parse_commit("0123456").unwrap_err();
        assert!(err.contains("full 40 character commit id"));
    }

    #[test]
    fn test_parse_commit_rejects_non_hex() {
        assert!(parse_commit(&"g".repeat(40)).is_err());
    }
}
