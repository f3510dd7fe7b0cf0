//! Release notes composition.

/// Joins changelog notes and provider generated notes.
///
/// Blank parts are left out.
#[must_use]
pub fn compose(changelog_notes: &str, provider_notes: &str) -> String {
    let changelog = changelog_notes.trim_end();

    if provider_notes.trim().is_empty() {
        return changelog.to_string();
    }
    if changelog.trim().is_empty() {
        return provider_notes.to_string();
    }
    format!("{changelog}\n\n{provider_notes}")
}
