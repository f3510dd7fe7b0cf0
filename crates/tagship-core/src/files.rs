//! Discovery of the files published with a release.
//!
//! Patterns are glob expressions relative to a working directory. A single
//! entry may hold several patterns separated by newlines, which is how CI
//! inputs usually arrive.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::Pattern;
use tagship_git::FileChangeSet;
use tracing::{debug, warn};

use crate::{CoreError, CoreResult};

/// Resolves `patterns` against `working_dir`.
///
/// Returns the matched files as paths relative to `working_dir`, sorted and
/// without duplicates. Directories are skipped.
///
/// # Errors
///
/// Returns an error if a pattern is malformed or points outside the working
/// directory, or if a matched path cannot be read.
pub fn discover_files<S: AsRef<str>>(working_dir: &Path, patterns: &[S]) -> CoreResult<Vec<PathBuf>> {
    // glob drops a leading `./`, so matches are stripped against an absolute base.
    let root = std::path::absolute(working_dir)?;
    let base = Pattern::escape(&root.to_string_lossy());
    let mut found = BTreeSet::new();

    for pattern in patterns
        .iter()
        .flat_map(|entry| entry.as_ref().lines())
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        let invalid = |reason: String| CoreError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        if Path::new(pattern).is_absolute()
            || Path::new(pattern)
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(invalid("must stay inside the working directory".to_string()));
        }

        let full = format!("{base}/{pattern}");
        let entries = glob::glob(&full).map_err(|e| invalid(e.to_string()))?;

        let mut matched = 0_usize;
        for entry in entries {
            let path = entry.map_err(std::io::Error::from)?;
            if !path.is_file() {
                continue;
            }
            let relative = path
                .strip_prefix(&root)
                .map_err(|_| invalid("matched a path outside the working directory".to_string()))?;
            found.insert(relative.to_path_buf());
            matched += 1;
        }

        if matched == 0 {
            warn!(pattern, "pattern matched no files");
        } else {
            debug!(pattern, matched, "pattern resolved");
        }
    }

    Ok(found.into_iter().collect())
}

/// Reads the files matched by `patterns` into `changes`.
///
/// Each file is staged under its path relative to `working_dir`. Returns the
/// number of files staged.
///
/// # Errors
///
/// Returns an error if discovery fails or a file cannot be read.
pub fn collect_files<S: AsRef<str>>(
    working_dir: &Path,
    patterns: &[S],
    changes: &mut FileChangeSet,
) -> CoreResult<usize> {
    let files = discover_files(working_dir, patterns)?;

    for relative in &files {
        let content = fs::read(working_dir.join(relative))?;
        let repo_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!(path = %repo_path, bytes = content.len(), "staging file");
        changes.insert(&repo_path, content)?;
    }

    Ok(files.len())
}
