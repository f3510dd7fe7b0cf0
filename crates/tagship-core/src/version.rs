//! Version resolution.
//!
//! The next version is derived from the highest release tag (or a seed when
//! there is none) and either a bump action or an explicit version. Versions
//! are compared by semantic precedence, so build metadata never makes a
//! version "greater".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use tagship_git::TAGS_NAMESPACE;
use tracing::debug;

use crate::{CoreError, CoreResult};

/// Prefix of release tags.
pub const TAG_PREFIX: &str = "v";

/// Baseline version when no release tag exists.
pub const DEFAULT_SEED: &str = "0.0.1";

/// A semantic version increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BumpAction {
    /// `1.2.3 -> 2.0.0`
    Major,
    /// `1.2.3 -> 2.0.0-0`
    Premajor,
    /// `1.2.3 -> 1.3.0`
    Minor,
    /// `1.2.3 -> 1.3.0-0`
    Preminor,
    /// `1.2.3 -> 1.2.4`
    Patch,
    /// `1.2.3 -> 1.2.4-0`
    Prepatch,
    /// `1.2.4-0 -> 1.2.4-1`
    Prerelease,
}

impl BumpAction {
    /// All actions, in the order they are documented.
    pub const ALL: [Self; 7] = [
        Self::Major,
        Self::Premajor,
        Self::Minor,
        Self::Preminor,
        Self::Patch,
        Self::Prepatch,
        Self::Prerelease,
    ];

    /// Returns the action name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Premajor => "premajor",
            Self::Minor => "minor",
            Self::Preminor => "preminor",
            Self::Patch => "patch",
            Self::Prepatch => "prepatch",
            Self::Prerelease => "prerelease",
        }
    }

    /// Parses an action name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|action| action.as_str() == name)
    }
}

impl fmt::Display for BumpAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionRequest {
    /// Increment the current version.
    Bump(BumpAction),
    /// Release exactly this version.
    Explicit(Version),
}

impl FromStr for VersionRequest {
    type Err = CoreError;

    /// Parses a bump action name, or a version with an optional leading `v`.
    fn from_str(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        if let Some(action) = BumpAction::parse(trimmed) {
            return Ok(Self::Bump(action));
        }

        let bare = trimmed.strip_prefix(TAG_PREFIX).unwrap_or(trimmed);
        Version::parse(bare)
            .map(Self::Explicit)
            .map_err(|_| CoreError::InvalidVersion {
                input: input.to_string(),
            })
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bump(action) => write!(f, "{action}"),
            Self::Explicit(version) => write!(f, "{version}"),
        }
    }
}

/// The outcome of version resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Version to release.
    pub version: Version,
    /// Tag to create.
    pub tag: String,
    /// Baseline version.
    pub previous_version: Version,
    /// Tag of the baseline version.
    pub previous_tag: String,
    /// Bump action, when one was requested.
    pub action: Option<BumpAction>,
    /// Whether the baseline came from an existing tag rather than the seed.
    pub has_previous_tag: bool,
}

/// Returns the release tag of a version.
#[must_use]
pub fn tag_for(version: &Version) -> String {
    format!("{TAG_PREFIX}{version}")
}

/// Extracts the version of a release tag (`v1.2.3` or `refs/tags/v1.2.3`).
#[must_use]
pub fn version_from_tag(tag: &str) -> Option<Version> {
    let name = tag.strip_prefix(TAGS_NAMESPACE).unwrap_or(tag);
    let bare = name.strip_prefix(TAG_PREFIX)?;
    Version::parse(bare).ok()
}

/// Compares two versions by semantic precedence (build metadata ignored).
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Identifier {
    Numeric(u64),
    Alpha(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => f.write_str(s),
        }
    }
}

fn identifiers(pre: &Prerelease) -> Vec<Identifier> {
    if pre.is_empty() {
        return Vec::new();
    }
    pre.as_str()
        .split('.')
        .map(|part| match part.parse::<u64>() {
            Ok(n) if part.bytes().all(|b| b.is_ascii_digit()) => Identifier::Numeric(n),
            _ => Identifier::Alpha(part.to_string()),
        })
        .collect()
}

/// Resolves the next release version.
#[derive(Debug, Clone)]
pub struct VersionResolver {
    seed: Version,
    pre_id: Option<String>,
}

impl VersionResolver {
    /// Creates a resolver seeded with [`DEFAULT_SEED`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            seed: Version::new(0, 0, 1),
            pre_id: None,
        }
    }

    /// Creates a resolver with a custom seed version.
    #[must_use]
    pub fn with_seed(seed: Version) -> Self {
        Self { seed, pre_id: None }
    }

    /// Parses a seed version (a leading `v` is accepted).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidVersion`] if the seed is not a version.
    pub fn parse_seed(seed: &str) -> CoreResult<Version> {
        match seed.parse::<VersionRequest>()? {
            VersionRequest::Explicit(version) => Ok(version),
            VersionRequest::Bump(_) => Err(CoreError::InvalidVersion {
                input: seed.to_string(),
            }),
        }
    }

    /// Sets the pre-release identifier used by pre-* actions.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidVersion`] if the identifier cannot appear
    /// in a pre-release.
    pub fn with_pre_id(mut self, pre_id: Option<&str>) -> CoreResult<Self> {
        if let Some(id) = pre_id {
            let valid = !id.is_empty()
                && !id.contains('.')
                && Prerelease::new(id).is_ok()
                && !id.bytes().all(|b| b.is_ascii_digit());
            if !valid {
                return Err(CoreError::InvalidVersion {
                    input: id.to_string(),
                });
            }
        }
        self.pre_id = pre_id.map(str::to_string);
        Ok(self)
    }

    /// Returns the seed version.
    #[must_use]
    pub fn seed(&self) -> &Version {
        &self.seed
    }

    /// Returns the highest version among `tags` and the seed, and whether it
    /// came from a tag.
    ///
    /// Tags that are not release tags are ignored.
    pub fn baseline<'a>(&self, tags: impl IntoIterator<Item = &'a str>) -> (Version, bool) {
        let mut best = self.seed.clone();
        let mut from_tag = false;

        for tag in tags {
            let Some(version) = version_from_tag(tag) else {
                debug!(tag, "ignoring tag that is not a release version");
                continue;
            };
            match precedence(&version, &best) {
                Ordering::Greater => {
                    best = version;
                    from_tag = true;
                }
                Ordering::Equal if !from_tag => {
                    best = version;
                    from_tag = true;
                }
                _ => {}
            }
        }

        (best, from_tag)
    }

    /// Resolves the version to release.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotAdvancing`] if the result is not
    /// strictly greater than the current version.
    pub fn resolve<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
        request: &VersionRequest,
    ) -> CoreResult<Resolution> {
        let (previous, has_previous_tag) = self.baseline(tags);

        let (version, action) = match request {
            VersionRequest::Bump(action) => (self.bump(&previous, *action)?, Some(*action)),
            VersionRequest::Explicit(version) => (version.clone(), None),
        };

        if precedence(&version, &previous) != Ordering::Greater {
            return Err(CoreError::VersionNotAdvancing {
                version,
                current: previous,
            });
        }

        debug!(
            previous = %previous,
            next = %version,
            action = ?action,
            has_previous_tag,
            "resolved version"
        );

        Ok(Resolution {
            tag: tag_for(&version),
            previous_tag: tag_for(&previous),
            version,
            previous_version: previous,
            action,
            has_previous_tag,
        })
    }

    /// Applies a bump action to a version.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidVersion`] if a component overflows.
    pub fn bump(&self, version: &Version, action: BumpAction) -> CoreResult<Version> {
        let overflow = || CoreError::InvalidVersion {
            input: version.to_string(),
        };
        let mut next = version.clone();
        next.build = BuildMetadata::EMPTY;

        match action {
            BumpAction::Major => {
                if next.minor != 0 || next.patch != 0 || next.pre.is_empty() {
                    next.major = next.major.checked_add(1).ok_or_else(overflow)?;
                }
                next.minor = 0;
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            BumpAction::Minor => {
                if next.patch != 0 || next.pre.is_empty() {
                    next.minor = next.minor.checked_add(1).ok_or_else(overflow)?;
                }
                next.patch = 0;
                next.pre = Prerelease::EMPTY;
            }
            BumpAction::Patch => {
                if next.pre.is_empty() {
                    next.patch = next.patch.checked_add(1).ok_or_else(overflow)?;
                }
                next.pre = Prerelease::EMPTY;
            }
            BumpAction::Premajor => {
                next.major = next.major.checked_add(1).ok_or_else(overflow)?;
                next.minor = 0;
                next.patch = 0;
                next.pre = self.start_prerelease()?;
            }
            BumpAction::Preminor => {
                next.minor = next.minor.checked_add(1).ok_or_else(overflow)?;
                next.patch = 0;
                next.pre = self.start_prerelease()?;
            }
            BumpAction::Prepatch => {
                next.patch = next.patch.checked_add(1).ok_or_else(overflow)?;
                next.pre = self.start_prerelease()?;
            }
            BumpAction::Prerelease => {
                if next.pre.is_empty() {
                    next.patch = next.patch.checked_add(1).ok_or_else(overflow)?;
                    next.pre = self.start_prerelease()?;
                } else {
                    next.pre = self.increment_prerelease(&next.pre)?;
                }
            }
        }

        Ok(next)
    }

    fn start_prerelease(&self) -> CoreResult<Prerelease> {
        let ids = match &self.pre_id {
            Some(id) => vec![Identifier::Alpha(id.clone()), Identifier::Numeric(0)],
            None => vec![Identifier::Numeric(0)],
        };
        Self::build_prerelease(&ids)
    }

    fn increment_prerelease(&self, pre: &Prerelease) -> CoreResult<Prerelease> {
        let mut ids = identifiers(pre);

        // Right-most numeric identifier, or a new trailing `0`.
        match ids
            .iter_mut()
            .rev()
            .find_map(|id| match id {
                Identifier::Numeric(n) => Some(n),
                Identifier::Alpha(_) => None,
            }) {
            Some(n) => {
                *n = n.checked_add(1).ok_or_else(|| CoreError::InvalidVersion {
                    input: pre.to_string(),
                })?;
            }
            None => ids.push(Identifier::Numeric(0)),
        }

        if let Some(pre_id) = &self.pre_id {
            let same_id = matches!(ids.first(), Some(Identifier::Alpha(first)) if first == pre_id);
            let numbered = matches!(ids.get(1), Some(Identifier::Numeric(_)));
            if !same_id || !numbered {
                ids = vec![Identifier::Alpha(pre_id.clone()), Identifier::Numeric(0)];
            }
        }

        Self::build_prerelease(&ids)
    }

    fn build_prerelease(ids: &[Identifier]) -> CoreResult<Prerelease> {
        let text = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        Prerelease::new(&text).map_err(|_| CoreError::InvalidVersion { input: text })
    }
}

impl Default for VersionResolver {
    fn default() -> Self {
        Self::new()
    }
}
