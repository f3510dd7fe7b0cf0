//! Repository on disk.
//!
//! Works on bare mirrors and regular clones alike; the work tree and the index
//! are never touched, only the object database and references.

use std::collections::BTreeMap;
use std::path::Path;

use git2::build::TreeUpdateBuilder;
use git2::{ErrorCode, ObjectType, Oid, Repository as Git2Repo, Sort, TreeWalkMode, TreeWalkResult};
use tracing::debug;

use crate::{
    CommitInfo, FileMode, GitError, GitResult, NewCommit, NotesProvider, ObjectId, ObjectStore,
    Signature, TAGS_NAMESPACE, TagRef, TagSource, Tree, TreeEntry, TreeOverlay, tag_ref,
};

const FALLBACK_NAME: &str = "tagship";
const FALLBACK_EMAIL: &str = "tagship@localhost";

/// A git repository on the local filesystem.
pub struct LocalStore {
    inner: Git2Repo,
}

impl LocalStore {
    /// Opens a repository at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a valid Git repository.
    pub fn open(path: impl AsRef<Path>) -> GitResult<Self> {
        let path = path.as_ref();
        let inner = Git2Repo::open(path).map_err(|_| GitError::NotARepo(path.to_path_buf()))?;
        Ok(Self { inner })
    }

    /// Initializes a bare repository at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be created.
    pub fn init_bare(path: impl AsRef<Path>) -> GitResult<Self> {
        let inner = Git2Repo::init_bare(path)?;
        Ok(Self { inner })
    }

    /// Returns the repository root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.workdir().unwrap_or_else(|| self.inner.path())
    }

    fn oid(id: &ObjectId) -> GitResult<Oid> {
        Oid::try_from(id)
    }

    fn not_found(err: git2::Error, what: impl Into<String>) -> GitError {
        if err.code() == ErrorCode::NotFound {
            GitError::ObjectNotFound(what.into())
        } else {
            GitError::Git2(err)
        }
    }

    fn signature(&self, author: Option<&Signature>) -> GitResult<git2::Signature<'static>> {
        if let Some(author) = author {
            return Ok(git2::Signature::now(&author.name, &author.email)?);
        }
        match self.inner.signature() {
            Ok(sig) => Ok(sig),
            Err(_) => Ok(git2::Signature::now(FALLBACK_NAME, FALLBACK_EMAIL)?),
        }
    }

    fn current_target(&self, reference: &str) -> GitResult<ObjectId> {
        match self.inner.find_reference(reference) {
            Ok(r) => Ok(r.peel_to_commit()?.id().into()),
            Err(e) if e.code() == ErrorCode::NotFound => {
                Err(GitError::RefNotFound(reference.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn file_mode(mode: FileMode) -> git2::FileMode {
    match mode {
        FileMode::Blob => git2::FileMode::Blob,
        FileMode::Executable => git2::FileMode::BlobExecutable,
        FileMode::Link => git2::FileMode::Link,
    }
}

impl ObjectStore for LocalStore {
    fn resolve_ref(&self, reference: &str) -> GitResult<ObjectId> {
        self.current_target(reference)
    }

    fn read_commit(&self, id: &ObjectId) -> GitResult<CommitInfo> {
        let commit = self
            .inner
            .find_commit(Self::oid(id)?)
            .map_err(|e| Self::not_found(e, id.as_str()))?;

        Ok(CommitInfo {
            id: commit.id().into(),
            tree: commit.tree_id().into(),
            parents: commit.parent_ids().map(ObjectId::from).collect(),
            message: commit.message().unwrap_or("").to_string(),
        })
    }

    fn read_tree(&self, id: &ObjectId) -> GitResult<Tree> {
        let tree = self
            .inner
            .find_tree(Self::oid(id)?)
            .map_err(|e| Self::not_found(e, id.as_str()))?;

        let mut entries = BTreeMap::new();
        tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                let mode = FileMode::from_octal(&format!("{:o}", entry.filemode()));
                if let (Some(name), Some(mode)) = (entry.name(), mode) {
                    entries.insert(
                        format!("{root}{name}"),
                        TreeEntry {
                            mode,
                            id: entry.id().into(),
                        },
                    );
                }
            }
            TreeWalkResult::Ok
        })?;

        Ok(Tree::new(entries))
    }

    fn read_file(&self, commit: &ObjectId, path: &str) -> GitResult<Option<Vec<u8>>> {
        let commit = self
            .inner
            .find_commit(Self::oid(commit)?)
            .map_err(|e| Self::not_found(e, commit.as_str()))?;
        let tree = commit.tree()?;

        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }

        let blob = self.inner.find_blob(entry.id())?;
        Ok(Some(blob.content().to_vec()))
    }

    fn create_blob(&self, content: &[u8]) -> GitResult<ObjectId> {
        Ok(self.inner.blob(content)?.into())
    }

    fn create_tree(&self, base: &ObjectId, overlay: &TreeOverlay) -> GitResult<ObjectId> {
        let base_tree = self
            .inner
            .find_tree(Self::oid(base)?)
            .map_err(|e| Self::not_found(e, base.as_str()))?;

        let mut builder = TreeUpdateBuilder::new();
        for (path, entry) in overlay.entries() {
            let oid = Self::oid(&entry.id)?;
            if self.inner.find_blob(oid).is_err() {
                return Err(GitError::ObjectNotFound(entry.id.to_string()));
            }
            builder.upsert(path.as_str(), oid, file_mode(entry.mode));
        }

        let tree = builder.create_updated(&self.inner, &base_tree)?;
        debug!(tree = %tree, paths = overlay.entries().len(), "tree written");
        Ok(tree.into())
    }

    fn create_commit(&self, commit: &NewCommit) -> GitResult<ObjectId> {
        let tree = self
            .inner
            .find_tree(Self::oid(&commit.tree)?)
            .map_err(|e| Self::not_found(e, commit.tree.as_str()))?;

        let parents = commit
            .parents
            .iter()
            .map(|id| {
                self.inner
                    .find_commit(Self::oid(id)?)
                    .map_err(|e| Self::not_found(e, id.as_str()))
            })
            .collect::<GitResult<Vec<_>>>()?;
        let parents: Vec<&git2::Commit<'_>> = parents.iter().collect();

        let sig = self.signature(commit.author.as_ref())?;
        let oid = self
            .inner
            .commit(None, &sig, &sig, &commit.message, &tree, &parents)?;
        Ok(oid.into())
    }

    fn update_ref(
        &self,
        reference: &str,
        expected: &ObjectId,
        target: &ObjectId,
    ) -> GitResult<()> {
        let target_oid = Self::oid(target)?;
        self.inner
            .find_commit(target_oid)
            .map_err(|e| Self::not_found(e, target.as_str()))?;

        let current = self.current_target(reference)?;
        if &current != expected {
            return Err(GitError::RefConflict {
                reference: reference.to_string(),
                expected: expected.clone(),
                actual: current.to_string(),
            });
        }

        // libgit2 re-checks the old value under the reference lock.
        let log_message = format!("tagship: release {}", target.short());
        match self.inner.reference_matching(
            reference,
            target_oid,
            true,
            Self::oid(expected)?,
            &log_message,
        ) {
            Ok(_) => Ok(()),
            Err(e) if matches!(e.code(), ErrorCode::Modified | ErrorCode::Locked) => {
                let actual = self
                    .current_target(reference)
                    .map_or_else(|_| "unknown".to_string(), |id| id.to_string());
                Err(GitError::RefConflict {
                    reference: reference.to_string(),
                    expected: expected.clone(),
                    actual,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn create_tag(&self, tag: &str, target: &ObjectId) -> GitResult<()> {
        let oid = Self::oid(target)?;
        self.inner
            .find_commit(oid)
            .map_err(|e| Self::not_found(e, target.as_str()))?;

        match self
            .inner
            .reference(&tag_ref(tag), oid, false, &format!("tagship: tag {tag}"))
        {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Exists => {
                Err(GitError::TagAlreadyExists(tag.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl TagSource for LocalStore {
    fn list_tags(&self) -> GitResult<Vec<TagRef>> {
        let mut tags = Vec::new();
        for reference in self.inner.references_glob(&format!("{TAGS_NAMESPACE}*"))? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };
            match reference.peel_to_commit() {
                Ok(commit) => tags.push(TagRef::new(name, commit.id().into())),
                Err(e) => debug!(tag = name, error = %e, "skipping tag that is not a commit"),
            }
        }
        Ok(tags)
    }
}

impl NotesProvider for LocalStore {
    fn generate_notes(
        &self,
        _tag: &str,
        previous_tag: Option<&str>,
        target: &str,
    ) -> GitResult<String> {
        let mut revwalk = self.inner.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(Self::oid(&self.current_target(target)?)?)?;

        if let Some(previous) = previous_tag {
            let stop = self.current_target(&tag_ref(previous))?;
            revwalk.hide(Self::oid(&stop)?)?;
        }

        let mut lines = Vec::new();
        for oid in revwalk {
            let commit = self.inner.find_commit(oid?)?;
            let id = ObjectId::from(commit.id());
            lines.push(format!(
                "* {} ({})",
                commit.summary().unwrap_or(""),
                id.short()
            ));
        }

        Ok(lines.join("\n"))
    }
}
