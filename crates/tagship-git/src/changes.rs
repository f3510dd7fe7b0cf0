//! File change sets.

use std::collections::BTreeMap;

use crate::{GitResult, normalize_path};

/// All files to be written in one release commit, keyed by repository path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileChangeSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl FileChangeSet {
    /// Creates an empty change set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the content of `path`, replacing any previous content for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a valid repository path.
    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) -> GitResult<()> {
        let path = normalize_path(path)?;
        self.files.insert(path, content.into());
        Ok(())
    }

    /// Returns the content staged for `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Iterates over `(path, content)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files
            .iter()
            .map(|(path, content)| (path.as_str(), content.as_slice()))
    }

    /// Returns the staged paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Returns the number of staged files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_normalizes_paths() {
        let mut changes = FileChangeSet::new();
        changes.insert("./dist/app.js", "x").unwrap();
        assert_eq!(changes.get("dist/app.js"), Some(b"x".as_slice()));
    }

    #[test]
    fn test_insert_replaces_same_path() {
        let mut changes = FileChangeSet::new();
        changes.insert("CHANGELOG.md", "old").unwrap();
        changes.insert("./CHANGELOG.md", "new").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes.get("CHANGELOG.md"), Some(b"new".as_slice()));
    }

    #[test]
    fn test_insert_rejects_parent_paths() {
        let mut changes = FileChangeSet::new();
        assert!(changes.insert("../secrets", "x").is_err());
        assert!(changes.is_empty());
    }

    #[test]
    fn test_iter_is_path_ordered() {
        let mut changes = FileChangeSet::new();
        changes.insert("b", "2").unwrap();
        changes.insert("a", "1").unwrap();
        let paths: Vec<_> = changes.paths().collect();
        assert_eq!(paths, vec!["a", "b"]);
        let first = changes.iter().next().unwrap();
        assert_eq!(first, ("a", b"1".as_slice()));
    }
}
