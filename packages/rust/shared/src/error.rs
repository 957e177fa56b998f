//! Error types for Leadflow.
//!
//! Library crates use [`LeadflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// A single problem found while validating a pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Step the problem belongs to, if it is step-scoped.
    pub step_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl Violation {
    /// A violation that is not tied to a particular step.
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            step_id: None,
            message: message.into(),
        }
    }

    /// A violation scoped to `step_id`.
    pub fn step(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step_id: Some(step_id.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(id) => write!(f, "step `{id}`: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Top-level error type for all Leadflow operations.
#[derive(Debug, thiserror::Error)]
pub enum LeadflowError {
    /// Application config (TOML) loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The pipeline definition is malformed or inconsistent.
    #[error("pipeline configuration invalid ({} violation(s)): {}", .violations.len(), join_violations(.violations))]
    Configuration { violations: Vec<Violation> },

    /// A step produced output that does not match its declared schema.
    #[error("schema violation in step `{step_id}`: {}", .problems.join("; "))]
    SchemaViolation {
        step_id: String,
        problems: Vec<String>,
    },

    /// A unit failed for any reason other than a schema mismatch.
    #[error("step `{step_id}` failed: {message}")]
    StepFailed { step_id: String, message: String },

    /// An external capability could not serve a call.
    #[error("capability `{capability}` unavailable: {reason}")]
    CapabilityUnavailable { capability: String, reason: String },

    /// Network/HTTP error outside of a capability call.
    #[error("network error: {0}")]
    Network(String),

    /// JSON/TOML parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LeadflowError>;

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LeadflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a list of definition violations.
    pub fn configuration(violations: Vec<Violation>) -> Self {
        Self::Configuration { violations }
    }

    /// Create a step failure.
    pub fn step_failed(step_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StepFailed {
            step_id: step_id.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Violations carried by a configuration error, empty otherwise.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Configuration { violations } => violations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LeadflowError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LeadflowError::step_failed("scoring", "bad input");
        assert_eq!(err.to_string(), "step `scoring` failed: bad input");
    }

    #[test]
    fn configuration_error_lists_every_violation() {
        let err = LeadflowError::configuration(vec![
            Violation::step("search", "duplicate step id"),
            Violation::global("weights sum to 0.9"),
        ]);
        let text = err.to_string();
        assert!(text.contains("2 violation(s)"));
        assert!(text.contains("step `search`: duplicate step id"));
        assert!(text.contains("weights sum to 0.9"));
        assert_eq!(err.violations().len(), 2);
    }
}
