//! Result and error types for mpycov.
//!
//! Batch operations (decoding many files, merging many captures) do not fail on
//! a single bad item; they return their output together with [`Warning`]s.
//! Single-run operations return [`CoverageResult`] and fail fast.

use std::fmt;
use thiserror::Error;

/// Result type for mpycov operations
pub type CoverageResult<T> = Result<T, CoverageError>;

/// Errors that can occur in mpycov
#[derive(Debug, Error)]
pub enum CoverageError {
    /// A required external binary is absent
    #[error("Required tool not found: {tool}. {hint}")]
    ToolMissing {
        /// Binary that was looked up
        tool: String,
        /// How to fix it
        hint: String,
    },

    /// One source file failed to compile or parse
    #[error("Compilation failed for {file}: {message}")]
    CompileFailure {
        /// Offending source file
        file: String,
        /// Error message
        message: String,
    },

    /// A stored capture could not be parsed
    #[error("Malformed capture {record}: {message}")]
    MalformedCapture {
        /// Storage identifier of the record
        record: String,
        /// Error message
        message: String,
    },

    /// The traced program exited nonzero or timed out
    ///
    /// Raised by whatever launches the program under the tracer. That runner
    /// lives outside this crate; the variant is here so its failures share
    /// one error type with the rest of the pipeline.
    #[error("Traced program failed: {message}")]
    RuntimeExecutionFailure {
        /// Error message
        message: String,
    },

    /// The program exited cleanly but produced no capture payload
    #[error("No coverage data found in output (missing {start} / {end} markers)")]
    NoCaptureData {
        /// Expected start sentinel
        start: &'static str,
        /// Expected end sentinel
        end: &'static str,
    },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoverageError {
    /// Create a compile failure for `file`
    #[must_use]
    pub fn compile_failure(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CompileFailure {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a malformed-capture error for `record`
    #[must_use]
    pub fn malformed_capture(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCapture {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the failure is scoped to one item of a batch
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CompileFailure { .. } | Self::MalformedCapture { .. }
        )
    }
}

/// A recoverable failure collected by a batch operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// File or record the warning is about
    pub subject: String,
    /// What went wrong
    pub message: String,
}

impl Warning {
    /// Create a new warning
    #[must_use]
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }

    /// Build a warning from a recoverable error
    #[must_use]
    pub fn from_error(subject: impl Into<String>, err: &CoverageError) -> Self {
        Self::new(subject, err.to_string())
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.subject, self.message)
    }
}
