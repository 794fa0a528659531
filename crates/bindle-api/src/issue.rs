//! Issue payloads for the reporter fan-out.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::BundleError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A diagnostic offered to every registered issue reporter.
///
/// Work errors are turned into issues before they surface to the caller;
/// components may also report issues of their own (e.g. deprecation
/// warnings) without failing the build.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    /// File the issue relates to, when known.
    pub file: Option<PathBuf>,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            file: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            file: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl From<&BundleError> for Issue {
    fn from(error: &BundleError) -> Self {
        let file = match error {
            BundleError::Io { path, .. } => Some(path.clone()),
            _ => None,
        };
        Self {
            severity: Severity::Error,
            message: error.to_string(),
            file,
        }
    }
}
