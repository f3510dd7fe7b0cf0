//! Immutable value types for content-addressed objects.
//!
//! These mirror the git object model closely enough that every backend can
//! translate them one-to-one:
//! - [`Blob`]: file content, identified by its git blob id
//! - [`Tree`]: a flattened snapshot mapping repository paths to entries
//! - [`TreeOverlay`]: path rebindings applied on top of a base tree
//! - [`NewCommit`]: a commit to be created, assembled with a builder

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use git2::{ObjectType, Oid};
use serde::{Deserialize, Serialize};

use crate::{GitError, GitResult};

/// Hex identifier of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    /// Wraps a hex object id.
    #[must_use]
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    /// Returns the full hex id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the abbreviated (7 character) id.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Oid> for ObjectId {
    fn from(oid: Oid) -> Self {
        Self(oid.to_string())
    }
}

impl TryFrom<&ObjectId> for Oid {
    type Error = GitError;

    fn try_from(id: &ObjectId) -> GitResult<Self> {
        Ok(Oid::from_str(id.as_str())?)
    }
}

/// Mode of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileMode {
    /// Regular file.
    #[default]
    Blob,
    /// Executable file.
    Executable,
    /// Symbolic link.
    Link,
}

impl FileMode {
    /// Returns the octal mode string used by git.
    #[must_use]
    pub fn as_octal(self) -> &'static str {
        match self {
            Self::Blob => "100644",
            Self::Executable => "100755",
            Self::Link => "120000",
        }
    }

    /// Parses an octal mode string. Non-file modes return `None`.
    #[must_use]
    pub fn from_octal(mode: &str) -> Option<Self> {
        match mode {
            "100644" | "100664" => Some(Self::Blob),
            "100755" => Some(Self::Executable),
            "120000" => Some(Self::Link),
            _ => None,
        }
    }
}

/// File content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    content: Vec<u8>,
}

impl Blob {
    /// Creates a blob from raw bytes.
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Returns the blob content.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Computes the git blob id of the content without touching any store.
    ///
    /// # Errors
    ///
    /// Returns an error if libgit2 cannot hash the content.
    pub fn id(&self) -> GitResult<ObjectId> {
        Ok(Oid::hash_object(ObjectType::Blob, &self.content)?.into())
    }
}

/// An entry of a flattened tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    /// Entry mode.
    pub mode: FileMode,
    /// Blob id.
    pub id: ObjectId,
}

impl TreeEntry {
    /// Creates a regular file entry.
    #[must_use]
    pub fn file(id: ObjectId) -> Self {
        Self {
            mode: FileMode::Blob,
            id,
        }
    }
}

/// A directory snapshot, flattened to `path -> entry`.
///
/// Only blob-like entries are listed; directories are implied by paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Creates a tree from path-keyed entries.
    #[must_use]
    pub fn new(entries: BTreeMap<String, TreeEntry>) -> Self {
        Self { entries }
    }

    /// Returns the entries.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, TreeEntry> {
        &self.entries
    }

    /// Returns the entry at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&TreeEntry> {
        self.entries.get(path)
    }

    /// Returns the number of files in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the tree has no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `overlay` on top of this tree.
    ///
    /// Overlay paths are rebound; every other entry is carried over as-is.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::InvalidPath`] if an overlay path would turn a file
    /// of this tree into a directory, or a directory into a file.
    pub fn overlay(&self, overlay: &TreeOverlay) -> GitResult<Self> {
        let mut entries = self.entries.clone();
        for (path, entry) in &overlay.entries {
            if let Some(other) = conflicting_path(&self.entries, path) {
                return Err(path_conflict(path, other));
            }
            entries.insert(path.clone(), entry.clone());
        }
        Ok(Self { entries })
    }

    /// Returns the paths whose entry differs between the two trees.
    #[must_use]
    pub fn changed_paths(&self, other: &Self) -> BTreeSet<String> {
        let mut changed = BTreeSet::new();
        for (path, entry) in &self.entries {
            if other.entries.get(path) != Some(entry) {
                changed.insert(path.clone());
            }
        }
        for path in other.entries.keys() {
            if !self.entries.contains_key(path) {
                changed.insert(path.clone());
            }
        }
        changed
    }
}

/// Path rebindings applied on top of a base tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeOverlay {
    entries: BTreeMap<String, TreeEntry>,
}

impl TreeOverlay {
    /// Creates an overlay builder.
    #[must_use]
    pub fn builder() -> TreeOverlayBuilder {
        TreeOverlayBuilder::default()
    }

    /// Returns the rebound entries.
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, TreeEntry> {
        &self.entries
    }

    /// Returns the rebound paths.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns true if nothing is rebound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for [`TreeOverlay`].
#[derive(Debug, Default)]
pub struct TreeOverlayBuilder {
    entries: BTreeMap<String, TreeEntry>,
}

impl TreeOverlayBuilder {
    /// Rebinds `path` to a regular file blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a valid repository path.
    pub fn file(self, path: &str, id: ObjectId) -> GitResult<Self> {
        self.entry(path, TreeEntry::file(id))
    }

    /// Rebinds `path` to an entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a valid repository path, or if it
    /// is both a file and a directory within this overlay.
    pub fn entry(mut self, path: &str, entry: TreeEntry) -> GitResult<Self> {
        let path = normalize_path(path)?;
        if let Some(other) = conflicting_path(&self.entries, &path) {
            return Err(path_conflict(&path, other));
        }
        self.entries.insert(path, entry);
        Ok(self)
    }

    /// Builds the overlay.
    #[must_use]
    pub fn build(self) -> TreeOverlay {
        TreeOverlay {
            entries: self.entries,
        }
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Author name.
    pub name: String,
    /// Author email.
    pub email: String,
}

impl Signature {
    /// Creates a signature.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A stored commit, as read back from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Commit id.
    pub id: ObjectId,
    /// Root tree id.
    pub tree: ObjectId,
    /// Parent commit ids.
    pub parents: Vec<ObjectId>,
    /// Full commit message.
    pub message: String,
}

/// A commit to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCommit {
    /// Root tree id.
    pub tree: ObjectId,
    /// Parent commit ids.
    pub parents: Vec<ObjectId>,
    /// Commit message.
    pub message: String,
    /// Author; backends fall back to their own identity when absent.
    pub author: Option<Signature>,
}

impl NewCommit {
    /// Creates a commit builder for the given tree.
    #[must_use]
    pub fn builder(tree: ObjectId) -> NewCommitBuilder {
        NewCommitBuilder {
            tree,
            parents: Vec::new(),
            message: String::new(),
            author: None,
        }
    }
}

/// Builder for [`NewCommit`].
#[derive(Debug)]
pub struct NewCommitBuilder {
    tree: ObjectId,
    parents: Vec<ObjectId>,
    message: String,
    author: Option<Signature>,
}

impl NewCommitBuilder {
    /// Adds a parent.
    #[must_use]
    pub fn parent(mut self, parent: ObjectId) -> Self {
        self.parents.push(parent);
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the author.
    #[must_use]
    pub fn author(mut self, author: Option<Signature>) -> Self {
        self.author = author;
        self
    }

    /// Builds the commit.
    #[must_use]
    pub fn build(self) -> NewCommit {
        NewCommit {
            tree: self.tree,
            parents: self.parents,
            message: self.message,
            author: self.author,
        }
    }
}

/// Finds an entry of `entries` that is a parent directory of `path`, or
/// that lives under `path` taken as a directory.
fn conflicting_path<'a>(entries: &'a BTreeMap<String, TreeEntry>, path: &str) -> Option<&'a str> {
    let parent = path
        .match_indices('/')
        .find_map(|(end, _)| entries.get_key_value(&path[..end]));
    if let Some((key, _)) = parent {
        return Some(key.as_str());
    }

    let dir = format!("{path}/");
    entries
        .range(dir.clone()..)
        .next()
        .map(|(key, _)| key.as_str())
        .filter(|key| key.starts_with(&dir))
}

fn path_conflict(path: &str, other: &str) -> GitError {
    GitError::InvalidPath(format!("{path} conflicts with {other}"))
}

/// Normalizes a repository-relative path to `a/b/c` form.
///
/// # Errors
///
/// Returns an error for empty or absolute paths and for `.`/`..` components.
pub fn normalize_path(path: &str) -> GitResult<String> {
    let unified = path.replace('\\', "/");
    let trimmed = unified.trim_start_matches("./");

    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(GitError::InvalidPath(path.to_string()));
    }

    let mut parts = Vec::new();
    for part in trimmed.split('/') {
        match part {
            "" => {}
            "." | ".." => return Err(GitError::InvalidPath(path.to_string())),
            _ => parts.push(part),
        }
    }

    if parts.is_empty() {
        return Err(GitError::InvalidPath(path.to_string()));
    }

    Ok(parts.join("/"))
}
