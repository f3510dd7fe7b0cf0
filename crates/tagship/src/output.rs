//! Command outputs.
//!
//! Outputs are printed as `key=value` lines, or as a JSON object. When
//! `GITHUB_OUTPUT` names a file they are appended to it as well, so later
//! workflow steps can read them.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tagship_core::Resolution;

/// Environment variable naming the workflow output file.
pub const GITHUB_OUTPUT: &str = "GITHUB_OUTPUT";

const DELIMITER: &str = "TAGSHIP_EOF";

/// How outputs are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// `key=value` lines
    #[default]
    Text,
    /// A JSON object
    Json,
}

/// Ordered output values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    entries: Vec<(String, String)>,
}

impl Outputs {
    /// Creates an empty set of outputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// The version outputs of a resolution.
    pub fn from_resolution(resolution: &Resolution) -> Self {
        Self::new()
            .with("version", resolution.version.to_string())
            .with("tag", &resolution.tag)
            .with("previous-version", resolution.previous_version.to_string())
            .with("previous-tag", &resolution.previous_tag)
    }

    /// Adds an output.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.entries.push((key.to_string(), value.into()));
        self
    }

    /// Returns the value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Renders `key=value` lines; multi-line values use heredoc blocks.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            if value.contains('\n') || value.contains('\r') {
                let delimiter = delimiter_for(value);
                _ = writeln!(out, "{key}<<{delimiter}");
                _ = writeln!(out, "{value}");
                _ = writeln!(out, "{delimiter}");
            } else {
                _ = writeln!(out, "{key}={value}");
            }
        }
        out
    }

    /// Renders a JSON object.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let object: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::to_string_pretty(&object).context("failed to serialize outputs")
    }

    /// Appends the outputs to a workflow output file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append_to(&self, path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open output file {}", path.display()))?;
        file.write_all(self.to_text().as_bytes())
            .with_context(|| format!("failed to write output file {}", path.display()))
    }

    /// Prints the outputs and appends them to `GITHUB_OUTPUT` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the outputs cannot be rendered or written.
    pub fn emit(&self, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => print!("{}", self.to_text()),
            OutputFormat::Json => println!("{}", self.to_json()?),
        }

        if let Some(path) = std::env::var_os(GITHUB_OUTPUT).filter(|p| !p.is_empty()) {
            self.append_to(Path::new(&path))?;
            tracing::debug!(path = ?path, "outputs appended");
        }
        Ok(())
    }
}

/// Picks a heredoc delimiter that does not occur in `value`.
fn delimiter_for(value: &str) -> String {
    let mut delimiter = DELIMITER.to_string();
    let mut n = 0_u32;
    while value.lines().any(|line| line == delimiter) {
        n += 1;
        delimiter = format!("{DELIMITER}_{n}");
    }
    delimiter
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> Outputs {
        Outputs::new()
            .with("version", "1.2.0")
            .with("tag", "v1.2.0")
            .with("release-notes", "- one\n- two")
    }

    #[test]
    fn test_to_text() {
        assert_eq!(
            sample().to_text(),
            "version=1.2.0\ntag=v1.2.0\nrelease-notes<<TAGSHIP_EOF\n- one\n- two\nTAGSHIP_EOF\n"
        );
    }

    #[test]
    fn test_delimiter_avoids_value_lines() {
        assert_eq!(delimiter_for("a\nb"), "TAGSHIP_EOF");
        assert_eq!(delimiter_for("a\nTAGSHIP_EOF\nb"), "TAGSHIP_EOF_1");
        assert_eq!(
            delimiter_for("TAGSHIP_EOF\nTAGSHIP_EOF_1"),
            "TAGSHIP_EOF_2"
        );
    }

    #[test]
    fn test_to_json() {
        let json: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        assert_eq!(json["tag"], "v1.2.0");
        assert_eq!(json["release-notes"], "- one\n- two");
    }

    #[test]
    fn test_get() {
        let outputs = sample();
        assert_eq!(outputs.get("tag"), Some("v1.2.0"));
        assert_eq!(outputs.get("missing"), None);
    }

    #[test]
    fn test_append_to_keeps_existing_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("output");
        std::fs::write(&path, "earlier=1\n").unwrap();

        Outputs::new().with("tag", "v1.0.0").append_to(&path).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "earlier=1\ntag=v1.0.0\n"
        );
    }

    #[test]
    fn test_from_resolution() {
        let resolution = tagship_core::VersionResolver::new()
            .resolve(["v1.0.0"], &"minor".parse().unwrap())
            .unwrap();
        let outputs = Outputs::from_resolution(&resolution);

        assert_eq!(outputs.get("version"), Some("1.1.0"));
        assert_eq!(outputs.get("tag"), Some("v1.1.0"));
        assert_eq!(outputs.get("previous-version"), Some("1.0.0"));
        assert_eq!(outputs.get("previous-tag"), Some("v1.0.0"));
    }
}
