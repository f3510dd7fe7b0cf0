//! Git object model and release publishing for tagship.
//!
//! Releases are written straight into a repository's object database: blobs,
//! an overlay tree, a commit, then a compare-and-swap branch update and a tag.
//! No working copy is involved.

mod changes;
mod error;
mod github;
mod local;
mod memory;
mod objects;
mod publisher;
mod store;

pub use changes::FileChangeSet;
pub use error::{GitError, GitResult};
pub use github::{GithubStore, GithubStoreBuilder};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use objects::{
    Blob, CommitInfo, FileMode, NewCommit, NewCommitBuilder, ObjectId, Signature, Tree, TreeEntry,
    TreeOverlay, TreeOverlayBuilder, normalize_path,
};
pub use publisher::{AtomicPublisher, PublishOptions, PublishReceipt, release_message};
pub use store::{
    HEADS_NAMESPACE, NotesProvider, ObjectStore, Remote, TAGS_NAMESPACE, TagRef, TagSource,
    qualify_branch, tag_ref,
};
