//! Backend traits.
//!
//! A release needs three capabilities from the hosting side:
//! - [`ObjectStore`]: content-addressed objects plus conflict-detecting refs
//! - [`TagSource`]: the existing release tags
//! - [`NotesProvider`]: a summary of changes between two tags
//!
//! [`Remote`] bundles the three and is implemented automatically.

use crate::{CommitInfo, GitError, GitResult, NewCommit, ObjectId, Tree, TreeOverlay};

/// Namespace of tag references.
pub const TAGS_NAMESPACE: &str = "refs/tags/";

/// Namespace of branch references.
pub const HEADS_NAMESPACE: &str = "refs/heads/";

/// A tag reference as listed by a [`TagSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRef {
    /// Full reference name (e.g., `refs/tags/v1.2.3`).
    pub name: String,
    /// Object the tag points to.
    pub target: ObjectId,
}

impl TagRef {
    /// Creates a tag reference.
    #[must_use]
    pub fn new(name: impl Into<String>, target: ObjectId) -> Self {
        Self {
            name: name.into(),
            target,
        }
    }

    /// Returns the tag name without the `refs/tags/` namespace.
    #[must_use]
    pub fn tag_name(&self) -> &str {
        self.name.strip_prefix(TAGS_NAMESPACE).unwrap_or(&self.name)
    }
}

/// Returns the full reference name of a tag.
#[must_use]
pub fn tag_ref(tag: &str) -> String {
    if tag.starts_with(TAGS_NAMESPACE) {
        tag.to_string()
    } else {
        format!("{TAGS_NAMESPACE}{tag}")
    }
}

/// Qualifies a short branch name (`main`) as `refs/heads/main`.
#[must_use]
pub fn qualify_branch(reference: &str) -> String {
    if reference.starts_with("refs/") {
        reference.to_string()
    } else {
        format!("{HEADS_NAMESPACE}{reference}")
    }
}

/// Content-addressed object storage with conflict-detecting references.
pub trait ObjectStore {
    /// Resolves a full reference name to the commit it points to.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::RefNotFound`] if the reference does not exist.
    fn resolve_ref(&self, reference: &str) -> GitResult<ObjectId>;

    /// Reads a commit.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be read.
    fn read_commit(&self, id: &ObjectId) -> GitResult<CommitInfo>;

    /// Reads a tree, flattened to file paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be read.
    fn read_tree(&self, id: &ObjectId) -> GitResult<Tree>;

    /// Reads the content of `path` at `commit`, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be read.
    fn read_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>>;

    /// Stores file content. Storing the same content twice yields the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be stored.
    fn create_blob(&self, content: &[u8]) -> GitResult<ObjectId>;

    /// Stores several blobs. Ids are returned in input order.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    fn create_blobs(&self, contents: &[&[u8]]) -> GitResult<Vec<ObjectId>> {
        contents.iter().map(|c| self.create_blob(c)).collect()
    }

    /// Creates a tree equal to `base` with the overlay paths rebound.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be created.
    fn create_tree(&self, base: &ObjectId, overlay: &TreeOverlay) -> GitResult<ObjectId>;

    /// Creates a commit object. No reference is moved.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit cannot be created.
    fn create_commit(&self, commit: &NewCommit) -> GitResult<ObjectId>;

    /// Moves `reference` from `expected` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::RefConflict`] if the reference no longer points to
    /// `expected`; the reference is left untouched in that case.
    fn update_ref(&self, reference: &str, expected: &ObjectId, target: &ObjectId)
    -> GitResult<()>;

    /// Creates a tag pointing to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::TagAlreadyExists`] if the tag exists.
    fn create_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()>;

    /// Returns true if the tag exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    fn tag_exists(&self, tag: &str) -> GitResult<bool> {
        match self.resolve_ref(&tag_ref(tag)) {
            Ok(_) => Ok(true),
            Err(GitError::RefNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Lists existing tags.
pub trait TagSource {
    /// Returns all tag references.
    ///
    /// # Errors
    ///
    /// Returns an error if tags cannot be listed.
    fn list_tags(&self) -> GitResult<Vec<TagRef>>;
}

/// Summarizes changes between two tags.
pub trait NotesProvider {
    /// Generates notes for `tag`, covering changes since `previous_tag` up to
    /// the tip of `target`. Without a previous tag the whole history is
    /// covered.
    ///
    /// # Errors
    ///
    /// Returns an error if the notes cannot be generated.
    fn generate_notes(&self, tag: &str, previous_tag: Option<&str>, target: &str)
    -> GitResult<String>;
}

/// Everything a release needs from the hosting side.
pub trait Remote: ObjectStore + TagSource + NotesProvider {}

impl<T: ObjectStore + TagSource + NotesProvider + ?Sized> Remote for T {}
