//! Error types for the CLI

use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// The capture store holds no records
    #[error("No coverage data files found in {}", dir.display())]
    EmptyStore {
        /// Data directory that was searched
        dir: PathBuf,
    },

    /// Stored records exist but none executed anything
    #[error("No coverage entries found in data files")]
    NoEntries,

    /// Some inputs of a batch command could not be processed
    #[error("{failed} of {total} file(s) could not be analyzed")]
    Incomplete {
        /// Inputs that failed
        failed: usize,
        /// Inputs attempted
        total: usize,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file error
    #[error("Config file error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// mpycov library error
    #[error(transparent)]
    Coverage(#[from] mpycov::CoverageError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an empty store error
    #[must_use]
    pub fn empty_store(dir: impl Into<PathBuf>) -> Self {
        Self::EmptyStore { dir: dir.into() }
    }
}
