//! In-memory build configuration.
//!
//! Loading and validating configuration *files* is the embedder's job;
//! this is the already-assembled shape the engine consumes.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BundleError, Result};
use crate::output::{OutputFormats, OutputPattern};

/// Where artifacts go and how they are named.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory all public paths are relative to.
    pub root_directory: PathBuf,
    /// Glob-pattern table over chunk formats; see [`crate::output`].
    pub formats: OutputFormats,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let mut formats = OutputFormats::default();
        formats.insert("*".into(), OutputPattern::Template("[id].[format]".into()));
        Self {
            root_directory: PathBuf::from("dist"),
            formats,
        }
    }
}

/// Top-level configuration for one bundling session.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BundleConfig {
    /// Entry request strings, resolved strictly at the start of a pass.
    pub entries: Vec<String>,
    /// Project root; entry requests resolve relative to it.
    pub root_directory: PathBuf,
    pub output: OutputConfig,
}

impl BundleConfig {
    pub fn new(root_directory: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            root_directory: root_directory.into(),
            output: OutputConfig::default(),
        }
    }

    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entries.push(entry.into());
        self
    }

    pub fn with_format(mut self, pattern: impl Into<String>, output: OutputPattern) -> Self {
        self.output.formats.insert(pattern.into(), output);
        self
    }

    pub fn with_output_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.root_directory = dir.into();
        self
    }

    /// Fatal configuration checks, run before any build work starts.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(BundleError::Config("no entries configured".into()));
        }
        if self.output.formats.is_empty() {
            return Err(BundleError::Config("no output formats configured".into()));
        }
        Ok(())
    }
}
