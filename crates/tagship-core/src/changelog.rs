//! Changelog handling.
//!
//! A changelog is a preamble followed by level-2 sections:
//!
//! ```text
//! # Changelog
//!
//! ## [Unreleased]
//!
//! - pending change
//!
//! ## [1.2.0] - 2024-05-01
//!
//! - released change
//! ```
//!
//! Releasing moves the unreleased body under a dated version heading and
//! leaves an empty unreleased section on top.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use semver::Version;
use thiserror::Error;
use tracing::{debug, warn};

/// Heading written for a fresh unreleased section.
pub const UNRELEASED_HEADING: &str = "## [Unreleased]";

const SECTION_PREFIX: &str = "## ";

static RELEASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^##\s+\[?v?(?P<version>[^\]\s]+)\]?(?:\s+-\s+(?P<date>.+?))?\s*$")
        .expect("invalid regex")
});

/// Changelog errors.
#[derive(Debug, Error)]
pub enum ChangelogError {
    /// The document structure is invalid.
    #[error("changelog parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// No section for the requested version.
    #[error("changelog section not found: {0}")]
    SectionNotFound(String),

    /// The unreleased notes were already moved under a version.
    #[error("changelog has already been reset")]
    AlreadyReset,

    /// The changelog could not be written.
    #[error("cannot write changelog to {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The changelog could not be read.
    #[error("cannot read changelog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for changelog operations.
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// A section heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Heading {
    /// The unreleased marker.
    Unreleased {
        /// Heading line as written.
        raw: String,
    },
    /// A released version.
    Release {
        /// Heading line as written.
        raw: String,
        /// Version, when the heading carries a valid one.
        version: Option<Version>,
        /// Date text, when present.
        date: Option<String>,
    },
}

impl Heading {
    fn parse(line: &str) -> Self {
        let raw = line.trim_end().to_string();
        let title = line.strip_prefix(SECTION_PREFIX).unwrap_or_default().trim();

        if title.eq_ignore_ascii_case("[unreleased]") || title.eq_ignore_ascii_case("unreleased") {
            return Self::Unreleased { raw };
        }

        let (version, date) = match RELEASE_HEADING.captures(&raw) {
            Some(caps) => (
                caps.name("version")
                    .and_then(|m| Version::parse(m.as_str()).ok()),
                caps.name("date").map(|m| m.as_str().to_string()),
            ),
            None => (None, None),
        };
        Self::Release { raw, version, date }
    }

    /// Returns the heading line.
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Unreleased { raw } | Self::Release { raw, .. } => raw,
        }
    }

    /// Returns true for the unreleased marker.
    #[must_use]
    pub fn is_unreleased(&self) -> bool {
        matches!(self, Self::Unreleased { .. })
    }

    /// Returns the version of a release heading.
    #[must_use]
    pub fn version(&self) -> Option<&Version> {
        match self {
            Self::Release { version, .. } => version.as_ref(),
            Self::Unreleased { .. } => None,
        }
    }
}

/// A heading and its body lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section heading.
    pub heading: Heading,
    /// Body lines, without leading or trailing blank lines.
    pub body: Vec<String>,
}

impl Section {
    fn unreleased() -> Self {
        Self {
            heading: Heading::Unreleased {
                raw: UNRELEASED_HEADING.to_string(),
            },
            body: Vec::new(),
        }
    }

    /// Returns the body as text.
    #[must_use]
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }
}

fn trim_blank_lines(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let leading = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..leading);
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// A parsed changelog document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Changelog {
    preamble: Vec<String>,
    sections: Vec<Section>,
}

impl Changelog {
    /// Parses a changelog.
    ///
    /// A missing unreleased section is inserted above the first section,
    /// unless `require_unreleased` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::Parse`] for a duplicate or misplaced
    /// unreleased section, or a missing one when it is required.
    pub fn parse(text: &str, require_unreleased: bool) -> ChangelogResult<Self> {
        let mut preamble = Vec::new();
        let mut sections: Vec<Section> = Vec::new();
        let mut unreleased_line = None;
        let mut in_fence = false;

        for (index, line) in text.lines().enumerate() {
            let line_no = index + 1;

            if is_fence(line) {
                in_fence = !in_fence;
            }

            if !in_fence && line.starts_with(SECTION_PREFIX) {
                let heading = Heading::parse(line);
                if heading.is_unreleased() {
                    if let Some(first) = unreleased_line {
                        return Err(ChangelogError::Parse {
                            line: line_no,
                            reason: format!("duplicate unreleased section (first at line {first})"),
                        });
                    }
                    if !sections.is_empty() {
                        return Err(ChangelogError::Parse {
                            line: line_no,
                            reason: "unreleased section must come before released versions"
                                .to_string(),
                        });
                    }
                    unreleased_line = Some(line_no);
                }
                sections.push(Section {
                    heading,
                    body: Vec::new(),
                });
                continue;
            }

            match sections.last_mut() {
                Some(section) => section.body.push(line.to_string()),
                None => preamble.push(line.to_string()),
            }
        }

        if unreleased_line.is_none() {
            if require_unreleased {
                return Err(ChangelogError::Parse {
                    line: text.lines().count() + 1,
                    reason: format!("no unreleased section (expected {UNRELEASED_HEADING:?})"),
                });
            }
            warn!("changelog has no unreleased section, starting an empty one");
            sections.insert(0, Section::unreleased());
        }

        trim_blank_lines(&mut preamble);
        for section in &mut sections {
            trim_blank_lines(&mut section.body);
        }

        debug!(sections = sections.len(), "parsed changelog");
        Ok(Self { preamble, sections })
    }

    /// Returns the preamble lines.
    #[must_use]
    pub fn preamble(&self) -> &[String] {
        &self.preamble
    }

    /// Returns the sections in document order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Returns the unreleased section.
    #[must_use]
    pub fn unreleased(&self) -> Option<&Section> {
        self.sections.iter().find(|s| s.heading.is_unreleased())
    }

    /// Returns the section of a released version (build metadata ignored).
    #[must_use]
    pub fn release(&self, version: &Version) -> Option<&Section> {
        self.sections.iter().find(|s| {
            s.heading.version().is_some_and(|v| {
                (v.major, v.minor, v.patch, &v.pre)
                    == (version.major, version.minor, version.patch, &version.pre)
            })
        })
    }

    /// Renders the document.
    #[must_use]
    pub fn render(&self) -> String {
        let mut blocks: Vec<String> = Vec::new();
        if !self.preamble.is_empty() {
            blocks.push(self.preamble.join("\n"));
        }
        for section in &self.sections {
            if section.body.is_empty() {
                blocks.push(section.heading.raw().to_string());
            } else {
                blocks.push(format!("{}\n\n{}", section.heading.raw(), section.body_text()));
            }
        }

        if blocks.is_empty() {
            return String::new();
        }
        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}

/// Returns the heading of a released version.
#[must_use]
pub fn new_header(version: &Version, date: NaiveDate) -> String {
    format!("## [{version}] - {}", date.format("%Y-%m-%d"))
}

/// Where a changelog is read from and written to.
pub trait ChangelogStore {
    /// Reads the changelog at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::Read`] if it cannot be read.
    fn read(&self, path: &Path) -> ChangelogResult<String>;

    /// Writes the changelog to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::Persistence`] if it cannot be written.
    fn write(&self, path: &Path, text: &str) -> ChangelogResult<()>;
}

/// Changelog store on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsChangelogStore;

impl ChangelogStore for FsChangelogStore {
    fn read(&self, path: &Path) -> ChangelogResult<String> {
        fs::read_to_string(path).map_err(|source| ChangelogError::Read {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path, text: &str) -> ChangelogResult<()> {
        let persist = |source| ChangelogError::Persistence {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist)?;
        }
        fs::write(path, text).map_err(persist)
    }
}

/// Lifecycle of a changelog during a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangelogState {
    /// Parsed, untouched.
    Loaded,
    /// Release notes were read.
    NotesExtracted,
    /// Unreleased notes were moved under a version.
    Reset,
}

/// Drives a changelog through a release.
#[derive(Debug, Clone)]
pub struct ChangelogEngine {
    document: Changelog,
    state: ChangelogState,
}

impl ChangelogEngine {
    /// Parses changelog text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid changelog.
    pub fn load(text: &str, require_unreleased: bool) -> ChangelogResult<Self> {
        Ok(Self {
            document: Changelog::parse(text, require_unreleased)?,
            state: ChangelogState::Loaded,
        })
    }

    /// Reads and parses the changelog at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if it cannot be read or parsed.
    pub fn read(
        store: &dyn ChangelogStore,
        path: &Path,
        require_unreleased: bool,
    ) -> ChangelogResult<Self> {
        debug!(?path, "reading changelog");
        Self::load(&store.read(path)?, require_unreleased)
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ChangelogState {
        self.state
    }

    /// Returns the document.
    #[must_use]
    pub fn document(&self) -> &Changelog {
        &self.document
    }

    /// Returns the notes of the unreleased section, or of a released version.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::SectionNotFound`] if there is no such section.
    pub fn release_notes(&mut self, version: Option<&str>) -> ChangelogResult<String> {
        let section = match version {
            None => self.document.unreleased(),
            Some(requested) => {
                let bare = requested.strip_prefix('v').unwrap_or(requested);
                Version::parse(bare)
                    .ok()
                    .and_then(|v| self.document.release(&v))
            }
        };
        let notes = section
            .map(Section::body_text)
            .ok_or_else(|| ChangelogError::SectionNotFound(version.unwrap_or("Unreleased").to_string()))?;

        if self.state == ChangelogState::Loaded {
            self.state = ChangelogState::NotesExtracted;
        }
        Ok(notes)
    }

    /// Moves the unreleased notes under a heading for `version` and returns
    /// the rewritten document.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::AlreadyReset`] if this engine was already
    /// reset or the document already has a section for `version`.
    pub fn reset(&mut self, version: &Version, date: NaiveDate) -> ChangelogResult<String> {
        if self.state == ChangelogState::Reset || self.document.release(version).is_some() {
            return Err(ChangelogError::AlreadyReset);
        }

        let index = self
            .document
            .sections
            .iter()
            .position(|s| s.heading.is_unreleased())
            .ok_or_else(|| ChangelogError::SectionNotFound("Unreleased".to_string()))?;

        let body = std::mem::take(&mut self.document.sections[index].body);
        let released = Section {
            heading: Heading::Release {
                raw: new_header(version, date),
                version: Some(version.clone()),
                date: Some(date.format("%Y-%m-%d").to_string()),
            },
            body,
        };
        self.document.sections.insert(index + 1, released);
        self.state = ChangelogState::Reset;

        debug!(%version, "changelog reset");
        Ok(self.document.render())
    }

    /// Renders the document.
    #[must_use]
    pub fn render(&self) -> String {
        self.document.render()
    }

    /// Writes the document to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChangelogError::Persistence`] if it cannot be written.
    pub fn save(&self, store: &dyn ChangelogStore, path: &Path) -> ChangelogResult<()> {
        store.write(path, &self.document.render())?;
        debug!(?path, "changelog saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\
# Changelog

All notable changes to this project are documented here.

## [Unreleased]

### Added

- Release automation

## [1.0.0] - 2024-01-15

- First release
";

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_parse_sections() {
        let doc = Changelog::parse(SAMPLE, true).unwrap();
        assert_eq!(doc.preamble().len(), 3);
        assert_eq!(doc.sections().len(), 2);

        let unreleased = doc.unreleased().unwrap();
        assert_eq!(unreleased.body_text(), "### Added\n\n- Release automation");

        let Heading::Release { version, date, .. } = &doc.sections()[1].heading else {
            panic!("expected a release heading");
        };
        assert_eq!(version.as_ref(), Some(&v("1.0.0")));
        assert_eq!(date.as_deref(), Some("2024-01-15"));
    }

    #[test]
    fn test_render_round_trip() {
        let doc = Changelog::parse(SAMPLE, true).unwrap();
        assert_eq!(doc.render(), SAMPLE);
    }

    #[test]
    fn test_render_normalizes_blank_lines() {
        let doc = Changelog::parse("## Unreleased\n\n\n- a\n\n\n\n## [1.0.0]\n- b\n\n", true).unwrap();
        assert_eq!(doc.render(), "## Unreleased\n\n- a\n\n## [1.0.0]\n\n- b\n");
    }

    #[test]
    fn test_unreleased_marker_is_case_insensitive() {
        for marker in ["## [Unreleased]", "## Unreleased", "## [UNRELEASED]", "## unreleased"] {
            let doc = Changelog::parse(&format!("{marker}\n\n- x\n"), true).unwrap();
            assert_eq!(doc.unreleased().unwrap().body_text(), "- x", "{marker}");
        }
    }

    #[test]
    fn test_headings_inside_code_fences_are_ignored() {
        let text = "## [Unreleased]\n\n```md\n## [9.9.9] - not a heading\n```\n";
        let doc = Changelog::parse(text, true).unwrap();
        assert_eq!(doc.sections().len(), 1);
        assert!(doc.unreleased().unwrap().body_text().contains("## [9.9.9]"));
    }

    #[test]
    fn test_missing_unreleased_is_inserted() {
        let doc = Changelog::parse("# Changelog\n\n## [1.0.0] - 2024-01-15\n\n- a\n", false).unwrap();
        assert!(doc.sections()[0].heading.is_unreleased());
        assert!(doc.unreleased().unwrap().body.is_empty());
    }

    #[test]
    fn test_empty_document() {
        let doc = Changelog::parse("", false).unwrap();
        assert_eq!(doc.render(), "## [Unreleased]\n");
    }

    #[test]
    fn test_missing_unreleased_can_be_required() {
        let result = Changelog::parse("## [1.0.0]\n", true);
        assert!(matches!(result, Err(ChangelogError::Parse { .. })));
    }

    #[test]
    fn test_duplicate_unreleased() {
        let result = Changelog::parse("## [Unreleased]\n\n- a\n\n## Unreleased\n", false);
        assert!(matches!(result, Err(ChangelogError::Parse { line: 5, .. })));
    }

    #[test]
    fn test_unreleased_below_release() {
        let result = Changelog::parse("## [1.0.0]\n\n- a\n\n## [Unreleased]\n", false);
        assert!(matches!(result, Err(ChangelogError::Parse { line: 5, .. })));
    }

    #[test]
    fn test_bare_heading_is_a_release_section() {
        let doc = Changelog::parse("## [Unreleased]\n\n## \n", true).unwrap();
        assert_eq!(doc.sections().len(), 2);
        assert_eq!(doc.sections()[1].heading.version(), None);
    }

    #[test]
    fn test_new_header() {
        assert_eq!(new_header(&v("1.2.0"), date()), "## [1.2.0] - 2024-06-01");
    }

    #[test]
    fn test_release_notes_state() {
        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        assert_eq!(engine.state(), ChangelogState::Loaded);

        let notes = engine.release_notes(None).unwrap();
        assert_eq!(notes, "### Added\n\n- Release automation");
        assert_eq!(engine.state(), ChangelogState::NotesExtracted);
        assert_eq!(engine.render(), SAMPLE);
    }

    #[test]
    fn test_release_notes_for_version() {
        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        assert_eq!(engine.release_notes(Some("v1.0.0")).unwrap(), "- First release");
        assert!(matches!(
            engine.release_notes(Some("2.0.0")),
            Err(ChangelogError::SectionNotFound(v)) if v == "2.0.0"
        ));
    }

    #[test]
    fn test_reset() {
        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        let before = engine.release_notes(None).unwrap();

        let text = engine.reset(&v("1.1.0"), date()).unwrap();
        assert_eq!(engine.state(), ChangelogState::Reset);
        assert_eq!(
            text,
            "\
# Changelog

All notable changes to this project are documented here.

## [Unreleased]

## [1.1.0] - 2024-06-01

### Added

- Release automation

## [1.0.0] - 2024-01-15

- First release
"
        );

        let reparsed = Changelog::parse(&text, true).unwrap();
        assert!(reparsed.unreleased().unwrap().body.is_empty());
        assert_eq!(reparsed.release(&v("1.1.0")).unwrap().body_text(), before);
    }

    #[test]
    fn test_reset_twice() {
        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        engine.reset(&v("1.1.0"), date()).unwrap();
        assert!(matches!(
            engine.reset(&v("1.2.0"), date()),
            Err(ChangelogError::AlreadyReset)
        ));
    }

    #[test]
    fn test_reset_existing_version() {
        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        assert!(matches!(
            engine.reset(&v("1.0.0"), date()),
            Err(ChangelogError::AlreadyReset)
        ));
    }

    #[test]
    fn test_fs_store_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("dist/nested/CHANGELOG.md");

        let mut engine = ChangelogEngine::load(SAMPLE, true).unwrap();
        engine.reset(&v("1.1.0"), date()).unwrap();
        engine.save(&FsChangelogStore, &path).unwrap();

        let reread = ChangelogEngine::read(&FsChangelogStore, &path, true).unwrap();
        assert_eq!(reread.render(), engine.render());
    }

    #[test]
    fn test_fs_store_read_missing() {
        let result = FsChangelogStore.read(Path::new("/nonexistent/CHANGELOG.md"));
        assert!(matches!(result, Err(ChangelogError::Read { .. })));
    }

    #[test]
    fn test_fs_store_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();

        let result = FsChangelogStore.write(&blocker.join("CHANGELOG.md"), "x");
        assert!(matches!(result, Err(ChangelogError::Persistence { .. })));
    }
}
