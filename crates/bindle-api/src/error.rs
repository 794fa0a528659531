//! Error types for the bundling pipeline.
//!
//! Errors split into two top-level categories: configuration errors
//! (detected before any build work starts) and work errors, subdivided
//! into resolve / transform / generate failures. Plugin-contract
//! violations are converted into the matching work error carrying the
//! offending component's name and validation messages; a genuine error
//! raised by a plugin propagates unchanged through the `Other` variant.

use std::path::PathBuf;

/// Detail payload for a failed resolve/transform/generate operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkError {
    /// Name of the component that produced the invalid result, if any.
    pub component: Option<String>,
    /// Human-readable description of the failure.
    pub message: String,
    /// Validation messages, when the failure is a contract violation.
    pub messages: Vec<String>,
}

impl WorkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            component: None,
            message: message.into(),
            messages: Vec::new(),
        }
    }

    pub fn invalid(component: impl Into<String>, messages: Vec<String>) -> Self {
        let component = component.into();
        Self {
            message: format!("'{component}' returned an invalid result"),
            component: Some(component),
            messages,
        }
    }

    pub fn in_component(
        component: impl Into<String>,
        message: impl Into<String>,
        messages: Vec<String>,
    ) -> Self {
        Self {
            component: Some(component.into()),
            message: message.into(),
            messages,
        }
    }
}

impl std::fmt::Display for WorkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if !self.messages.is_empty() {
            write!(f, ": {}", self.messages.join(", "))?;
        }
        Ok(())
    }
}

/// Error type for bundling operations.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// Invalid configuration, detected before any build work starts.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A file request could not be resolved.
    #[error("Resolution failed: {0}")]
    ResolveFailed(WorkError),

    /// A file, job or generated chunk could not be transformed.
    #[error("Transform failed: {0}")]
    TransformFailed(WorkError),

    /// No generator produced output for a chunk.
    #[error("Generation failed: {0}")]
    GenerateFailed(WorkError),

    /// I/O error with the path that caused it.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker pool was disposed while work was outstanding.
    #[error("Worker pool is not running")]
    PoolDisposed,

    /// Opaque error raised by a plugin, passed through unchanged.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BundleError {
    pub fn resolve_failed(message: impl Into<String>) -> Self {
        BundleError::ResolveFailed(WorkError::new(message))
    }

    pub fn transform_failed(message: impl Into<String>) -> Self {
        BundleError::TransformFailed(WorkError::new(message))
    }

    pub fn generate_failed(message: impl Into<String>) -> Self {
        BundleError::GenerateFailed(WorkError::new(message))
    }

    /// True for the resolve/transform/generate work categories.
    pub fn is_work(&self) -> bool {
        matches!(
            self,
            BundleError::ResolveFailed(_)
                | BundleError::TransformFailed(_)
                | BundleError::GenerateFailed(_)
        )
    }

    /// The offending component's name, when the error is a contract violation.
    pub fn component(&self) -> Option<&str> {
        match self {
            BundleError::ResolveFailed(w)
            | BundleError::TransformFailed(w)
            | BundleError::GenerateFailed(w) => w.component.as_deref(),
            _ => None,
        }
    }
}

/// Result type alias for bundling operations.
pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_error_display_with_messages() {
        let err = BundleError::ResolveFailed(WorkError::invalid(
            "node-resolver",
            vec!["format must not be empty".into(), "path must be set".into()],
        ));
        let rendered = err.to_string();
        assert!(rendered.contains("node-resolver"));
        assert!(rendered.contains("format must not be empty"));
        assert_eq!(err.component(), Some("node-resolver"));
    }

    #[test]
    fn test_work_categories() {
        assert!(BundleError::resolve_failed("x").is_work());
        assert!(BundleError::transform_failed("x").is_work());
        assert!(BundleError::generate_failed("x").is_work());
        assert!(!BundleError::Config("x".into()).is_work());
    }
}
