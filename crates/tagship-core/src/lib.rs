//! Core library for tagship.
//!
//! This crate provides the release orchestration logic: version resolution,
//! changelog rewriting, release notes and the release flow tying them to a
//! publish backend.

mod changelog;
mod error;
mod files;
mod notes;
mod release;
mod version;

pub use changelog::{
    Changelog, ChangelogEngine, ChangelogError, ChangelogResult, ChangelogState, ChangelogStore,
    FsChangelogStore, Heading, Section, UNRELEASED_HEADING, new_header,
};
pub use error::{CoreError, CoreResult};
pub use files::{collect_files, discover_files};
pub use notes::compose;
pub use release::{ReleaseManager, ReleaseOutcome};
pub use version::{
    BumpAction, DEFAULT_SEED, Resolution, TAG_PREFIX, VersionRequest, VersionResolver, tag_for,
    version_from_tag,
};
