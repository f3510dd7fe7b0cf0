//! In-process object store.
//!
//! Objects are content-addressed with git's hashing, references behave like a
//! hosted repository's (compare-and-swap updates, immutable tags). Useful for
//! rehearsing a release offline and as a test double.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use git2::{ObjectType, Oid};

use crate::{
    Blob, CommitInfo, GitError, GitResult, NewCommit, NotesProvider, ObjectId, ObjectStore,
    TAGS_NAMESPACE, TagRef, TagSource, Tree, TreeEntry, TreeOverlay, tag_ref,
};

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<ObjectId, Vec<u8>>,
    trees: HashMap<ObjectId, Tree>,
    commits: HashMap<ObjectId, CommitInfo>,
    refs: BTreeMap<String, ObjectId>,
}

/// An in-memory repository.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Commits `files` as the complete content of `reference`.
    ///
    /// The new commit's parent is the current tip of `reference`, if any, and
    /// the reference is moved unconditionally.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is invalid.
    pub fn seed<C: AsRef<[u8]>>(
        &self,
        reference: &str,
        files: &[(&str, C)],
        message: &str,
    ) -> GitResult<ObjectId> {
        let mut entries = BTreeMap::new();
        for (path, content) in files {
            let id = self.create_blob(content.as_ref())?;
            entries.insert(crate::normalize_path(path)?, TreeEntry::file(id));
        }
        let tree_id = self.insert_tree(Tree::new(entries))?;

        let parent = self.state().refs.get(reference).cloned();
        let mut builder = NewCommit::builder(tree_id).message(message);
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        let commit = self.create_commit(&builder.build())?;
        self.set_ref(reference, commit.clone());
        Ok(commit)
    }

    /// Points `reference` at `target` without any check.
    pub fn set_ref(&self, reference: &str, target: ObjectId) {
        self.state().refs.insert(reference.to_string(), target);
    }

    /// Returns a snapshot of all references.
    #[must_use]
    pub fn refs(&self) -> BTreeMap<String, ObjectId> {
        self.state().refs.clone()
    }

    /// Returns the number of stored commits.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state().commits.len()
    }

    fn insert_tree(&self, tree: Tree) -> GitResult<ObjectId> {
        let mut serialized = String::from("tree\n");
        for (path, entry) in tree.entries() {
            _ = writeln!(serialized, "{} {path} {}", entry.mode.as_octal(), entry.id);
        }
        let id = hash(serialized.as_bytes())?;
        self.state().trees.insert(id.clone(), tree);
        Ok(id)
    }

    fn commit_subject(info: &CommitInfo) -> &str {
        info.message.lines().next().unwrap_or_default()
    }
}

fn hash(bytes: &[u8]) -> GitResult<ObjectId> {
    Ok(Oid::hash_object(ObjectType::Blob, bytes)?.into())
}

impl ObjectStore for MemoryStore {
    fn resolve_ref(&self, reference: &str) -> GitResult<ObjectId> {
        self.state()
            .refs
            .get(reference)
            .cloned()
            .ok_or_else(|| GitError::RefNotFound(reference.to_string()))
    }

    fn read_commit(&self, id: &ObjectId) -> GitResult<CommitInfo> {
        self.state()
            .commits
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound(id.to_string()))
    }

    fn read_tree(&self, id: &ObjectId) -> GitResult<Tree> {
        self.state()
            .trees
            .get(id)
            .cloned()
            .ok_or_else(|| GitError::ObjectNotFound(id.to_string()))
    }

    fn read_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>> {
        let info = self.read_commit(commit)?;
        let tree = self.read_tree(&info.tree)?;
        let Some(entry) = tree.get(path) else {
            return Ok(None);
        };
        Ok(self.state().blobs.get(&entry.id).cloned())
    }

    fn create_blob(&self, content: &[u8]) -> GitResult<ObjectId> {
        let id = Blob::new(content).id()?;
        self.state()
            .blobs
            .entry(id.clone())
            .or_insert_with(|| content.to_vec());
        Ok(id)
    }

    fn create_tree(&self, base: &ObjectId, overlay: &TreeOverlay) -> GitResult<ObjectId> {
        let base_tree = self.read_tree(base)?;
        {
            let state = self.state();
            for entry in overlay.entries().values() {
                if !state.blobs.contains_key(&entry.id) {
                    return Err(GitError::ObjectNotFound(entry.id.to_string()));
                }
            }
        }
        self.insert_tree(base_tree.overlay(overlay)?)
    }

    fn create_commit(&self, commit: &NewCommit) -> GitResult<ObjectId> {
        let mut state = self.state();
        if !state.trees.contains_key(&commit.tree) {
            return Err(GitError::ObjectNotFound(commit.tree.to_string()));
        }

        let mut serialized = format!("commit\ntree {}\n", commit.tree);
        for parent in &commit.parents {
            if !state.commits.contains_key(parent) {
                return Err(GitError::ObjectNotFound(parent.to_string()));
            }
            _ = writeln!(serialized, "parent {parent}");
        }
        if let Some(author) = &commit.author {
            _ = writeln!(serialized, "author {} <{}>", author.name, author.email);
        }
        _ = write!(serialized, "\n{}", commit.message);

        let id = hash(serialized.as_bytes())?;
        state.commits.insert(
            id.clone(),
            CommitInfo {
                id: id.clone(),
                tree: commit.tree.clone(),
                parents: commit.parents.clone(),
                message: commit.message.clone(),
            },
        );
        Ok(id)
    }

    fn update_ref(
        &self,
        reference: &str,
        expected: &ObjectId,
        target: &ObjectId,
    ) -> GitResult<()> {
        let mut state = self.state();
        if !state.commits.contains_key(target) {
            return Err(GitError::ObjectNotFound(target.to_string()));
        }

        let current = state
            .refs
            .get(reference)
            .ok_or_else(|| GitError::RefNotFound(reference.to_string()))?;
        if current != expected {
            return Err(GitError::RefConflict {
                reference: reference.to_string(),
                expected: expected.clone(),
                actual: current.to_string(),
            });
        }

        state.refs.insert(reference.to_string(), target.clone());
        Ok(())
    }

    fn create_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()> {
        let mut state = self.state();
        if !state.commits.contains_key(target) {
            return Err(GitError::ObjectNotFound(target.to_string()));
        }

        let name = tag_ref(tag);
        if state.refs.contains_key(&name) {
            return Err(GitError::TagAlreadyExists(tag.to_string()));
        }
        state.refs.insert(name, target.clone());
        Ok(())
    }
}

impl TagSource for MemoryStore {
    fn list_tags(&self) -> GitResult<Vec<TagRef>> {
        Ok(self
            .state()
            .refs
            .iter()
            .filter(|(name, _)| name.starts_with(TAGS_NAMESPACE))
            .map(|(name, target)| TagRef::new(name.clone(), target.clone()))
            .collect())
    }
}

impl NotesProvider for MemoryStore {
    fn generate_notes(
        &self,
        _tag: &str,
        previous_tag: Option<&str>,
        target: &str,
    ) -> GitResult<String> {
        let stop = previous_tag
            .map(|tag| self.resolve_ref(&tag_ref(tag)))
            .transpose()?;
        let mut cursor = Some(self.resolve_ref(target)?);
        let mut lines = Vec::new();

        // First-parent walk, which is all a memory store ever produces.
        while let Some(id) = cursor {
            if stop.as_ref() == Some(&id) {
                break;
            }
            let info = self.read_commit(&id)?;
            lines.push(format!(
                "* {} ({})",
                Self::commit_subject(&info),
                info.id.short()
            ));
            cursor = info.parents.first().cloned();
        }

        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = "refs/heads/main";

    fn seeded() -> (MemoryStore, ObjectId) {
        let store = MemoryStore::new();
        let commit = store
            .seed(
                MAIN,
                &[("README.md", "readme"), ("src/lib.rs", "lib")],
                "initial",
            )
            .unwrap();
        (store, commit)
    }

    #[test]
    fn test_seed_sets_ref() {
        let (store, commit) = seeded();
        assert_eq!(store.resolve_ref(MAIN).unwrap(), commit);
        assert_eq!(
            store.read_file(&commit, "src/lib.rs").unwrap(),
            Some(b"lib".to_vec())
        );
        assert_eq!(store.read_file(&commit, "missing").unwrap(), None);
    }

    #[test]
    fn test_create_blob_twice_is_idempotent() {
        let store = MemoryStore::new();
        let first = store.create_blob(b"content").unwrap();
        let second = store.create_blob(b"content").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_create_tree_requires_known_blobs() {
        let (store, commit) = seeded();
        let base = store.read_commit(&commit).unwrap().tree;
        let overlay = TreeOverlay::builder()
            .file("x", ObjectId::new("0".repeat(40)))
            .unwrap()
            .build();
        assert!(matches!(
            store.create_tree(&base, &overlay),
            Err(GitError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_create_tree_rejects_file_directory_collision() {
        let (store, commit) = seeded();
        let base = store.read_commit(&commit).unwrap().tree;
        let blob = store.create_blob(b"nested").unwrap();
        let overlay = TreeOverlay::builder()
            .file("README.md/nested", blob)
            .unwrap()
            .build();

        assert!(matches!(
            store.create_tree(&base, &overlay),
            Err(GitError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_update_ref_compare_and_swap() {
        let (store, first) = seeded();
        let second = store.seed(MAIN, &[("a", "a")], "second").unwrap();

        // Ref is at `second`; expecting `first` must fail and leave it alone.
        let result = store.update_ref(MAIN, &first, &first);
        assert!(matches!(result, Err(GitError::RefConflict { .. })));
        assert_eq!(store.resolve_ref(MAIN).unwrap(), second);

        store.update_ref(MAIN, &second, &first).unwrap();
        assert_eq!(store.resolve_ref(MAIN).unwrap(), first);
    }

    #[test]
    fn test_create_tag_is_immutable() {
        let (store, commit) = seeded();
        store.create_tag("v1.0.0", &commit).unwrap();
        assert!(store.tag_exists("v1.0.0").unwrap());
        assert!(matches!(
            store.create_tag("v1.0.0", &commit),
            Err(GitError::TagAlreadyExists(tag)) if tag == "v1.0.0"
        ));
    }

    #[test]
    fn test_list_tags() {
        let (store, commit) = seeded();
        store.create_tag("v1.0.0", &commit).unwrap();
        let tags = store.list_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "refs/tags/v1.0.0");
        assert_eq!(tags[0].target, commit);
    }

    #[test]
    fn test_generate_notes_since_previous_tag() {
        let (store, first) = seeded();
        store.create_tag("v1.0.0", &first).unwrap();
        store.seed(MAIN, &[("a", "a")], "feat: second").unwrap();
        store.seed(MAIN, &[("a", "b")], "fix: third\n\nbody").unwrap();

        let notes = store.generate_notes("v1.1.0", Some("v1.0.0"), MAIN).unwrap();
        let lines: Vec<_> = notes.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("* fix: third ("));
        assert!(lines[1].starts_with("* feat: second ("));
    }

    #[test]
    fn test_generate_notes_without_previous_tag() {
        let (store, _) = seeded();
        let notes = store.generate_notes("v0.0.2", None, MAIN).unwrap();
        assert!(notes.starts_with("* initial ("));
    }
}
