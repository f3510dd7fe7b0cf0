//! Release orchestration.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tagship_config::{ChangelogSource, Config};
use tagship_git::{
    AtomicPublisher, FileChangeSet, ObjectId, PublishOptions, PublishReceipt, Remote, Signature,
    TagRef, normalize_path, qualify_branch,
};
use tracing::{debug, info, warn};

use crate::{
    ChangelogEngine, ChangelogError, ChangelogStore, CoreResult, FsChangelogStore, Resolution,
    VersionRequest, VersionResolver, collect_files, compose,
};

/// Everything a release run produced.
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    /// Resolved version and tag.
    pub resolution: Resolution,
    /// Notes taken from the unreleased changelog section.
    pub changelog_notes: String,
    /// Notes generated by the hosting side.
    pub provider_notes: String,
    /// Changelog and provider notes combined.
    pub notes: String,
    /// The rewritten changelog.
    pub changelog: String,
    /// Files of the release commit.
    pub changes: FileChangeSet,
    /// Set when the release was pushed.
    pub receipt: Option<PublishReceipt>,
}

/// Runs releases against a remote.
pub struct ReleaseManager<'a, R: Remote + ?Sized> {
    remote: &'a R,
    config: &'a Config,
    date: NaiveDate,
    changelog_store: Box<dyn ChangelogStore + 'a>,
}

impl<'a, R: Remote + ?Sized> ReleaseManager<'a, R> {
    /// Creates a release manager dated today (UTC).
    #[must_use]
    pub fn new(remote: &'a R, config: &'a Config) -> Self {
        Self {
            remote,
            config,
            date: Utc::now().date_naive(),
            changelog_store: Box::new(FsChangelogStore),
        }
    }

    /// Sets the release date written to the changelog.
    #[must_use]
    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = date;
        self
    }

    /// Replaces the store used for local changelog files.
    #[must_use]
    pub fn with_changelog_store(mut self, store: Box<dyn ChangelogStore + 'a>) -> Self {
        self.changelog_store = store;
        self
    }

    /// Returns the fully qualified target branch.
    #[must_use]
    pub fn reference(&self) -> String {
        qualify_branch(&self.config.repository.reference)
    }

    /// Resolves the next version from the remote's tags.
    ///
    /// # Errors
    ///
    /// Returns an error if tags cannot be listed or the version is invalid.
    pub fn resolve(&self, request: &VersionRequest) -> CoreResult<Resolution> {
        let tags = self.remote.list_tags()?;
        debug!(count = tags.len(), "listed tags");

        VersionResolver::with_seed(VersionResolver::parse_seed(&self.config.version.seed)?)
            .with_pre_id(self.config.version.pre_id.as_deref())?
            .resolve(tags.iter().map(TagRef::tag_name), request)
    }

    /// Returns the changelog notes of `version`, or the unreleased notes.
    ///
    /// # Errors
    ///
    /// Returns an error if the changelog cannot be loaded or has no such
    /// section.
    pub fn notes(&self, version: Option<&str>) -> CoreResult<String> {
        Ok(self.load_changelog()?.release_notes(version)?)
    }

    /// Runs a release.
    ///
    /// The changelog is rewritten, saved to the dist directory when one is
    /// configured and, when pushing is enabled, published together with the
    /// configured files in one commit tagged with the new version.
    ///
    /// # Errors
    ///
    /// Returns the first error; nothing is published when any step before
    /// the publish fails.
    pub fn release(&self, request: &VersionRequest) -> CoreResult<ReleaseOutcome> {
        info!("starting release");

        let resolution = self.resolve(request)?;
        info!(
            version = %resolution.version,
            previous = %resolution.previous_version,
            action = ?resolution.action,
            "resolved version"
        );

        let mut changelog = self.load_changelog()?;
        let changelog_notes = changelog.release_notes(None)?;
        let text = changelog.reset(&resolution.version, self.date)?;

        let publish = &self.config.publish;
        if let Some(dist) = &publish.dist {
            let path = publish
                .working_directory
                .join(dist)
                .join(&self.config.changelog.file);
            changelog.save(self.changelog_store.as_ref(), &path)?;
        } else {
            debug!("no dist directory, changelog kept in memory");
        }

        let reference = self.reference();
        let previous_tag = resolution
            .has_previous_tag
            .then_some(resolution.previous_tag.as_str());
        let provider_notes =
            self.remote
                .generate_notes(&resolution.tag, previous_tag, &reference)?;

        let mut changes = FileChangeSet::new();
        let staged = collect_files(&publish.working_directory, &publish.files, &mut changes)?;
        changes.insert(&self.changelog_path()?, text.clone())?;
        debug!(files = staged, "collected release files");

        let receipt = if publish.push {
            let receipt = AtomicPublisher::new(self.remote, reference)
                .with_options(self.publish_options())
                .publish(&resolution.tag, &changes)?;
            Some(receipt)
        } else {
            info!(tag = %resolution.tag, "push disabled, nothing published");
            None
        };

        let notes = compose(&changelog_notes, &provider_notes);
        info!(version = %resolution.version, "release completed");

        Ok(ReleaseOutcome {
            resolution,
            changelog_notes,
            provider_notes,
            notes,
            changelog: text,
            changes,
            receipt,
        })
    }

    /// Tags a release commit left untagged by an interrupted publish.
    ///
    /// # Errors
    ///
    /// Returns an error if `commit` is not the release commit of `tag` or the
    /// tag cannot be created.
    pub fn resume(
        &self,
        tag: &str,
        commit: &ObjectId,
        expected_changes: Option<&FileChangeSet>,
    ) -> CoreResult<PublishReceipt> {
        let receipt = AtomicPublisher::new(self.remote, self.reference())
            .with_options(self.publish_options())
            .resume_tag(tag, commit, expected_changes)?;
        Ok(receipt)
    }

    /// Returns the publisher options derived from the configuration.
    #[must_use]
    pub fn publish_options(&self) -> PublishOptions {
        let publish = &self.config.publish;
        PublishOptions {
            max_attempts: publish.max_attempts,
            retry_backoff: Duration::from_millis(publish.retry_backoff_ms),
            verify_tree: publish.verify_tree,
            author: publish
                .author
                .as_ref()
                .map(|author| Signature::new(&author.name, &author.email)),
        }
    }

    fn changelog_path(&self) -> CoreResult<String> {
        Ok(normalize_path(&self.config.changelog.file.to_string_lossy())?)
    }

    fn load_changelog(&self) -> CoreResult<ChangelogEngine> {
        let changelog = &self.config.changelog;

        match changelog.source {
            ChangelogSource::Local => {
                let path = self
                    .config
                    .publish
                    .working_directory
                    .join(&changelog.file);
                Ok(ChangelogEngine::read(
                    self.changelog_store.as_ref(),
                    &path,
                    changelog.require_unreleased,
                )?)
            }
            ChangelogSource::Remote => {
                let reference = self.reference();
                let path = self.changelog_path()?;
                let tip = self.remote.resolve_ref(&reference)?;
                debug!(%reference, %path, "reading changelog from remote");

                let text = match self.remote.read_file(&tip, &path)? {
                    Some(bytes) => String::from_utf8(bytes).map_err(|e| ChangelogError::Read {
                        path: PathBuf::from(&path),
                        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                    })?,
                    None => {
                        warn!(%path, "changelog not found on remote, starting a new one");
                        String::new()
                    }
                };
                Ok(ChangelogEngine::load(&text, changelog.require_unreleased)?)
            }
        }
    }
}
