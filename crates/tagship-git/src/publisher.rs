//! Atomic multi-file publishing.
//!
//! A release is published in one compare-and-swap on the target branch:
//!
//! 1. blobs are stored for every changed file
//! 2. a tree is derived from the branch tip with those paths rebound
//! 3. a commit is created on top of the branch tip
//! 4. the branch is moved only if it still points at that tip
//! 5. the release tag is created at the new commit
//!
//! Objects created before step 4 are unreachable until the branch moves, so
//! readers of the repository never observe a half-written release.

use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{
    Blob, FileChangeSet, GitError, GitResult, NewCommit, ObjectId, ObjectStore, Signature,
    TreeOverlay,
};

/// Returns the commit message of a release commit.
#[must_use]
pub fn release_message(tag: &str) -> String {
    format!("chore(release): {tag}")
}

/// Publishing behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Total attempts when the branch moves concurrently (at least 1).
    pub max_attempts: u32,
    /// Base delay between attempts; the n-th retry waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Read the new tree back and check it against the base tree.
    pub verify_tree: bool,
    /// Author of the release commit.
    pub author: Option<Signature>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff: Duration::from_millis(500),
            verify_tree: true,
            author: None,
        }
    }
}

/// What a successful publish created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Commit the release was built on.
    pub base: ObjectId,
    /// Tree of the release commit.
    pub tree: ObjectId,
    /// The release commit.
    pub commit: ObjectId,
    /// The release tag.
    pub tag: String,
    /// Attempts it took to move the branch.
    pub attempts: u32,
}

#[derive(Debug)]
struct Staged {
    base: ObjectId,
    tree: ObjectId,
    commit: ObjectId,
}

/// Publishes file changes and a tag onto a branch as one unit.
pub struct AtomicPublisher<'a, S: ObjectStore + ?Sized> {
    store: &'a S,
    reference: String,
    options: PublishOptions,
}

impl<'a, S: ObjectStore + ?Sized> AtomicPublisher<'a, S> {
    /// Creates a publisher targeting `reference` (a full ref name).
    #[must_use]
    pub fn new(store: &'a S, reference: impl Into<String>) -> Self {
        Self {
            store,
            reference: reference.into(),
            options: PublishOptions::default(),
        }
    }

    /// Replaces the publishing options.
    #[must_use]
    pub fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the target reference.
    #[must_use]
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Returns the publishing options.
    #[must_use]
    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    /// Publishes `changes` in a new commit on the target branch and tags it.
    ///
    /// # Errors
    ///
    /// - [`GitError::TagAlreadyExists`] before anything is written
    /// - [`GitError::RefConflict`] if the branch kept moving; the branch and
    ///   the tags are untouched
    /// - [`GitError::TreeMismatch`] if tree verification fails
    /// - [`GitError::PartialPublish`] if the branch moved but tagging failed
    pub fn publish(&self, tag: &str, changes: &FileChangeSet) -> GitResult<PublishReceipt> {
        if self.store.tag_exists(tag)? {
            return Err(GitError::TagAlreadyExists(tag.to_string()));
        }

        info!(
            tag,
            reference = %self.reference,
            files = changes.len(),
            "publishing release"
        );

        let overlay = self.store_blobs(changes)?;
        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 1;

        let staged = loop {
            match self.commit_onto_tip(tag, &overlay) {
                Ok(staged) => break staged,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.options.retry_backoff * attempt;
                    warn!(
                        attempt,
                        max_attempts,
                        delay = ?delay,
                        error = %e,
                        "branch moved concurrently, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        info!(commit = %staged.commit, reference = %self.reference, "branch updated");

        self.store
            .create_tag(tag, &staged.commit)
            .map_err(|source| GitError::PartialPublish {
                tag: tag.to_string(),
                commit: staged.commit.clone(),
                source: Box::new(source),
            })?;

        info!(tag, commit = %staged.commit, "release tagged");

        Ok(PublishReceipt {
            base: staged.base,
            tree: staged.tree,
            commit: staged.commit,
            tag: tag.to_string(),
            attempts: attempt,
        })
    }

    /// Tags a release commit left untagged by a partial publish.
    ///
    /// The commit must carry the release message for `tag`. When
    /// `expected_changes` is given, every path must hold exactly that content.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::CommitMismatch`] or [`GitError::TreeMismatch`] if
    /// the commit is not the expected release commit, and any tagging error.
    pub fn resume_tag(
        &self,
        tag: &str,
        commit: &ObjectId,
        expected_changes: Option<&FileChangeSet>,
    ) -> GitResult<PublishReceipt> {
        let info = self.store.read_commit(commit)?;

        let expected_message = release_message(tag);
        if info.message.trim_end() != expected_message {
            return Err(GitError::CommitMismatch {
                commit: commit.clone(),
                reason: format!(
                    "expected message {expected_message:?}, found {:?}",
                    info.message.trim_end()
                ),
            });
        }

        let base = info
            .parents
            .first()
            .cloned()
            .ok_or_else(|| GitError::CommitMismatch {
                commit: commit.clone(),
                reason: "release commit has no parent".to_string(),
            })?;

        if let Some(changes) = expected_changes {
            let tree = self.store.read_tree(&info.tree)?;
            for (path, content) in changes.iter() {
                let expected = Blob::new(content).id()?;
                match tree.get(path) {
                    Some(entry) if entry.id == expected => {}
                    Some(entry) => {
                        return Err(GitError::TreeMismatch {
                            path: path.to_string(),
                            reason: format!("expected blob {expected}, found {}", entry.id),
                        });
                    }
                    None => {
                        return Err(GitError::TreeMismatch {
                            path: path.to_string(),
                            reason: "missing from release commit".to_string(),
                        });
                    }
                }
            }
            debug!(files = changes.len(), "release commit content verified");
        }

        self.store.create_tag(tag, commit)?;
        info!(tag, commit = %commit, "release tagged");

        Ok(PublishReceipt {
            base,
            tree: info.tree,
            commit: commit.clone(),
            tag: tag.to_string(),
            attempts: 1,
        })
    }

    fn store_blobs(&self, changes: &FileChangeSet) -> GitResult<TreeOverlay> {
        let contents: Vec<&[u8]> = changes.iter().map(|(_, content)| content).collect();
        let ids = self.store.create_blobs(&contents)?;
        debug!(blobs = ids.len(), "blobs stored");

        let mut builder = TreeOverlay::builder();
        for (path, id) in changes.paths().zip(ids) {
            builder = builder.file(path, id)?;
        }
        Ok(builder.build())
    }

    fn commit_onto_tip(&self, tag: &str, overlay: &TreeOverlay) -> GitResult<Staged> {
        let base = self.store.resolve_ref(&self.reference)?;
        let base_commit = self.store.read_commit(&base)?;
        debug!(base = %base, "resolved branch tip");

        let tree = self.store.create_tree(&base_commit.tree, overlay)?;
        if self.options.verify_tree {
            self.verify_tree(&base_commit.tree, &tree, overlay)?;
        }

        let commit = NewCommit::builder(tree.clone())
            .parent(base.clone())
            .message(release_message(tag))
            .author(self.options.author.clone())
            .build();
        let commit = self.store.create_commit(&commit)?;
        debug!(commit = %commit, tree = %tree, "release commit created");

        self.store.update_ref(&self.reference, &base, &commit)?;

        Ok(Staged { base, tree, commit })
    }

    fn verify_tree(
        &self,
        base: &ObjectId,
        tree: &ObjectId,
        overlay: &TreeOverlay,
    ) -> GitResult<()> {
        let before = self.store.read_tree(base)?;
        let after = self.store.read_tree(tree)?;

        for (path, entry) in overlay.entries() {
            match after.get(path) {
                Some(found) if found.id == entry.id => {}
                Some(found) => {
                    return Err(GitError::TreeMismatch {
                        path: path.clone(),
                        reason: format!("expected blob {}, found {}", entry.id, found.id),
                    });
                }
                None => {
                    return Err(GitError::TreeMismatch {
                        path: path.clone(),
                        reason: "missing from new tree".to_string(),
                    });
                }
            }
        }

        if let Some(path) = before
            .changed_paths(&after)
            .into_iter()
            .find(|path| !overlay.entries().contains_key(path))
        {
            return Err(GitError::TreeMismatch {
                path,
                reason: "changed without being published".to_string(),
            });
        }

        debug!(tree = %tree, "tree verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{CommitInfo, MemoryStore, TagSource, Tree};

    const MAIN: &str = "refs/heads/main";

    /// Wraps a memory store and injects failures into the write path.
    struct Faulty<'a> {
        inner: &'a MemoryStore,
        concurrent_advances: Cell<u32>,
        fail_tag: Cell<bool>,
        tree_overrides: Cell<bool>,
    }

    impl<'a> Faulty<'a> {
        fn new(inner: &'a MemoryStore) -> Self {
            Self {
                inner,
                concurrent_advances: Cell::new(0),
                fail_tag: Cell::new(false),
                tree_overrides: Cell::new(false),
            }
        }
    }

    impl ObjectStore for Faulty<'_> {
        fn resolve_ref(&self, reference: &str) -> GitResult<ObjectId> {
            self.inner.resolve_ref(reference)
        }

        fn read_commit(&self, id: &ObjectId) -> GitResult<CommitInfo> {
            self.inner.read_commit(id)
        }

        fn read_tree(&self, id: &ObjectId) -> GitResult<Tree> {
            self.inner.read_tree(id)
        }

        fn read_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>> {
            self.inner.read_file(commit, path)
        }

        fn create_blob(&self, content: &[u8]) -> GitResult<ObjectId> {
            self.inner.create_blob(content)
        }

        fn create_tree(&self, base: &ObjectId, overlay: &TreeOverlay) -> GitResult<ObjectId> {
            if self.tree_overrides.get() {
                // Drops the overlay and rewrites an unrelated file instead.
                let stray = self.inner.create_blob(b"stray")?;
                let overlay = TreeOverlay::builder().file("stray.txt", stray)?.build();
                return self.inner.create_tree(base, &overlay);
            }
            self.inner.create_tree(base, overlay)
        }

        fn create_commit(&self, commit: &NewCommit) -> GitResult<ObjectId> {
            self.inner.create_commit(commit)
        }

        fn update_ref(
            &self,
            reference: &str,
            expected: &ObjectId,
            target: &ObjectId,
        ) -> GitResult<()> {
            let pending = self.concurrent_advances.get();
            if pending > 0 {
                self.concurrent_advances.set(pending - 1);
                self.inner
                    .seed(reference, &[("concurrent.txt", "other writer")], "concurrent")?;
            }
            self.inner.update_ref(reference, expected, target)
        }

        fn create_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()> {
            if self.fail_tag.get() {
                return Err(GitError::Api {
                    status: 502,
                    message: "bad gateway".to_string(),
                });
            }
            self.inner.create_tag(tag, target)
        }
    }

    fn ten_file_repo() -> (MemoryStore, ObjectId) {
        let store = MemoryStore::new();
        let files: Vec<(String, String)> = (0..10)
            .map(|i| (format!("src/file{i}.txt"), format!("content {i}")))
            .collect();
        let files: Vec<(&str, &str)> = files
            .iter()
            .map(|(p, c)| (p.as_str(), c.as_str()))
            .collect();
        let base = store.seed(MAIN, &files, "initial").unwrap();
        (store, base)
    }

    fn three_changes() -> FileChangeSet {
        let mut changes = FileChangeSet::new();
        changes.insert("src/file1.txt", "new 1").unwrap();
        changes.insert("src/file4.txt", "new 4").unwrap();
        changes.insert("src/file7.txt", "new 7").unwrap();
        changes
    }

    fn no_backoff(max_attempts: u32) -> PublishOptions {
        PublishOptions {
            max_attempts,
            retry_backoff: Duration::ZERO,
            ..PublishOptions::default()
        }
    }

    #[test]
    fn test_release_message() {
        assert_eq!(release_message("v1.2.3"), "chore(release): v1.2.3");
    }

    #[test]
    fn test_default_options() {
        let options = PublishOptions::default();
        assert_eq!(options.max_attempts, 1);
        assert_eq!(options.retry_backoff, Duration::from_millis(500));
        assert!(options.verify_tree);
        assert!(options.author.is_none());
    }

    #[test]
    fn test_publish_rebinds_exactly_the_changed_paths() {
        let (store, base) = ten_file_repo();
        let publisher = AtomicPublisher::new(&store, MAIN);

        let receipt = publisher.publish("v1.0.0", &three_changes()).unwrap();

        assert_eq!(receipt.base, base);
        assert_eq!(receipt.attempts, 1);
        assert_eq!(store.resolve_ref(MAIN).unwrap(), receipt.commit);

        let before = store.read_tree(&store.read_commit(&base).unwrap().tree).unwrap();
        let after = store.read_tree(&receipt.tree).unwrap();
        let changed: Vec<_> = before.changed_paths(&after).into_iter().collect();
        assert_eq!(
            changed,
            vec!["src/file1.txt", "src/file4.txt", "src/file7.txt"]
        );
        assert_eq!(after.len(), 10);
        assert_eq!(
            store.read_file(&receipt.commit, "src/file4.txt").unwrap(),
            Some(b"new 4".to_vec())
        );
    }

    #[test]
    fn test_publish_creates_commit_and_tag() {
        let (store, base) = ten_file_repo();
        let receipt = AtomicPublisher::new(&store, MAIN)
            .publish("v1.0.0", &three_changes())
            .unwrap();

        let commit = store.read_commit(&receipt.commit).unwrap();
        assert_eq!(commit.parents, vec![base]);
        assert_eq!(commit.message, "chore(release): v1.0.0");
        assert_eq!(commit.tree, receipt.tree);

        let tags = store.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag_name(), "v1.0.0");
        assert_eq!(tags[0].target, receipt.commit);
    }

    #[test]
    fn test_publish_new_file() {
        let (store, _) = ten_file_repo();
        let mut changes = FileChangeSet::new();
        changes.insert("CHANGELOG.md", "# Changelog\n").unwrap();

        let receipt = AtomicPublisher::new(&store, MAIN)
            .publish("v0.1.0", &changes)
            .unwrap();

        assert_eq!(store.read_tree(&receipt.tree).unwrap().len(), 11);
    }

    #[test]
    fn test_publish_unchanged_content_is_accepted() {
        let (store, _) = ten_file_repo();
        let mut changes = FileChangeSet::new();
        changes.insert("src/file0.txt", "content 0").unwrap();

        let receipt = AtomicPublisher::new(&store, MAIN)
            .publish("v0.1.0", &changes)
            .unwrap();

        assert_eq!(store.resolve_ref(MAIN).unwrap(), receipt.commit);
    }

    #[test]
    fn test_publish_existing_tag_fails_before_writing() {
        let (store, base) = ten_file_repo();
        store.create_tag("v1.0.0", &base).unwrap();
        let commits = store.commit_count();

        let result = AtomicPublisher::new(&store, MAIN).publish("v1.0.0", &three_changes());

        assert!(matches!(result, Err(GitError::TagAlreadyExists(tag)) if tag == "v1.0.0"));
        assert_eq!(store.commit_count(), commits);
        assert_eq!(store.resolve_ref(MAIN).unwrap(), base);
    }

    #[test]
    fn test_publish_missing_branch() {
        let store = MemoryStore::new();
        let result = AtomicPublisher::new(&store, MAIN).publish("v1.0.0", &three_changes());
        assert!(matches!(result, Err(GitError::RefNotFound(r)) if r == MAIN));
    }

    #[test]
    fn test_concurrent_advance_is_a_conflict_without_side_effects() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.concurrent_advances.set(1);

        let result = AtomicPublisher::new(&faulty, MAIN).publish("v1.0.0", &three_changes());

        let Err(GitError::RefConflict {
            reference, actual, ..
        }) = result
        else {
            panic!("expected a ref conflict");
        };
        assert_eq!(reference, MAIN);

        // The branch holds the other writer's commit, and no tag was created.
        let tip = store.resolve_ref(MAIN).unwrap();
        assert_eq!(actual, tip.to_string());
        assert_eq!(store.read_commit(&tip).unwrap().message, "concurrent");
        assert!(store.list_tags().unwrap().is_empty());
    }

    #[test]
    fn test_conflict_is_retried_on_the_new_tip() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.concurrent_advances.set(1);

        let receipt = AtomicPublisher::new(&faulty, MAIN)
            .with_options(no_backoff(3))
            .publish("v1.0.0", &three_changes())
            .unwrap();

        assert_eq!(receipt.attempts, 2);
        let base = store.read_commit(&receipt.base).unwrap();
        assert_eq!(base.message, "concurrent");
        assert_eq!(store.resolve_ref(MAIN).unwrap(), receipt.commit);
        assert!(store.tag_exists("v1.0.0").unwrap());
    }

    #[test]
    fn test_retries_are_bounded() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.concurrent_advances.set(5);

        let result = AtomicPublisher::new(&faulty, MAIN)
            .with_options(no_backoff(2))
            .publish("v1.0.0", &three_changes());

        assert!(matches!(result, Err(GitError::RefConflict { .. })));
        assert_eq!(faulty.concurrent_advances.get(), 3);
        assert!(store.list_tags().unwrap().is_empty());
    }

    #[test]
    fn test_tag_failure_is_a_partial_publish() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.fail_tag.set(true);

        let result = AtomicPublisher::new(&faulty, MAIN).publish("v1.0.0", &three_changes());

        let Err(GitError::PartialPublish {
            tag,
            commit,
            source,
        }) = result
        else {
            panic!("expected a partial publish");
        };
        assert_eq!(tag, "v1.0.0");
        assert_eq!(store.resolve_ref(MAIN).unwrap(), commit);
        assert!(matches!(*source, GitError::Api { status: 502, .. }));
        assert!(!store.tag_exists("v1.0.0").unwrap());
    }

    #[test]
    fn test_resume_tag_after_partial_publish() {
        let (store, base) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.fail_tag.set(true);
        let changes = three_changes();

        let Err(GitError::PartialPublish { commit, .. }) =
            AtomicPublisher::new(&faulty, MAIN).publish("v1.0.0", &changes)
        else {
            panic!("expected a partial publish");
        };

        let receipt = AtomicPublisher::new(&store, MAIN)
            .resume_tag("v1.0.0", &commit, Some(&changes))
            .unwrap();

        assert_eq!(receipt.commit, commit);
        assert_eq!(receipt.base, base);
        assert_eq!(store.resolve_ref("refs/tags/v1.0.0").unwrap(), commit);
    }

    #[test]
    fn test_resume_tag_rejects_foreign_commit() {
        let (store, base) = ten_file_repo();
        let result = AtomicPublisher::new(&store, MAIN).resume_tag("v1.0.0", &base, None);
        assert!(matches!(result, Err(GitError::CommitMismatch { .. })));
        assert!(!store.tag_exists("v1.0.0").unwrap());
    }

    #[test]
    fn test_resume_tag_rejects_unexpected_content() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.fail_tag.set(true);

        let Err(GitError::PartialPublish { commit, .. }) =
            AtomicPublisher::new(&faulty, MAIN).publish("v1.0.0", &three_changes())
        else {
            panic!("expected a partial publish");
        };

        let mut expected = FileChangeSet::new();
        expected.insert("src/file1.txt", "something else").unwrap();
        let result =
            AtomicPublisher::new(&store, MAIN).resume_tag("v1.0.0", &commit, Some(&expected));

        assert!(matches!(result, Err(GitError::TreeMismatch { path, .. }) if path == "src/file1.txt"));
        assert!(!store.tag_exists("v1.0.0").unwrap());
    }

    #[test]
    fn test_verify_tree_catches_a_misbehaving_backend() {
        let (store, base) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.tree_overrides.set(true);

        let result = AtomicPublisher::new(&faulty, MAIN).publish("v1.0.0", &three_changes());

        assert!(matches!(result, Err(GitError::TreeMismatch { .. })));
        assert_eq!(store.resolve_ref(MAIN).unwrap(), base);
    }

    #[test]
    fn test_verify_tree_can_be_disabled() {
        let (store, _) = ten_file_repo();
        let faulty = Faulty::new(&store);
        faulty.tree_overrides.set(true);

        let options = PublishOptions {
            verify_tree: false,
            ..PublishOptions::default()
        };
        let receipt = AtomicPublisher::new(&faulty, MAIN)
            .with_options(options)
            .publish("v1.0.0", &three_changes())
            .unwrap();

        assert!(store.read_file(&receipt.commit, "stray.txt").unwrap().is_some());
    }
}
