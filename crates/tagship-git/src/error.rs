//! Git error types.

use thiserror::Error;

use crate::ObjectId;

/// Git-related errors.
#[derive(Debug, Error)]
pub enum GitError {
    /// Not a git repository.
    #[error("not a git repository: {0}")]
    NotARepo(std::path::PathBuf),

    /// Reference not found.
    #[error("reference not found: {0}")]
    RefNotFound(String),

    /// Object not found in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// The reference moved while a release was being assembled.
    #[error("reference {reference} moved concurrently: expected {expected}, found {actual}")]
    RefConflict {
        reference: String,
        expected: ObjectId,
        actual: String,
    },

    /// Tag already exists.
    #[error("tag already exists: {0}")]
    TagAlreadyExists(String),

    /// The branch advanced but the release tag was not created.
    #[error("partial publish: branch advanced to {commit} but tag {tag} was not created: {source}")]
    PartialPublish {
        tag: String,
        commit: ObjectId,
        #[source]
        source: Box<GitError>,
    },

    /// A tree does not contain what the release expected.
    #[error("tree mismatch at {path}: {reason}")]
    TreeMismatch { path: String, reason: String },

    /// A commit is not the release commit it was expected to be.
    #[error("commit {commit} is not a release commit: {reason}")]
    CommitMismatch { commit: ObjectId, reason: String },

    /// Path cannot be written into a tree.
    #[error("invalid repository path: {0}")]
    InvalidPath(String),

    /// Remote API answered with an error status.
    #[error("remote API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Git2 error.
    #[error("git error: {0}")]
    Git2(#[from] git2::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitError {
    /// Returns true if the operation may succeed when retried from a fresh base.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RefConflict { .. })
    }
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;
