//! Device-to-host path mapping
//!
//! Paths in a capture are whatever the runtime reported: `/flash/lib/app.py`
//! on a board, a relative path on the unix port. Rules rewrite the prefix;
//! the first matching rule wins and unmatched paths pass through unchanged.

use crate::result::{CoverageError, CoverageResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// One `device=host` prefix rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    /// Prefix as reported by the runtime
    pub device: String,
    /// Replacement prefix on the host
    pub host: String,
}

impl PathRule {
    /// Create a rule
    #[must_use]
    pub fn new(device: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            host: host.into(),
        }
    }

    /// Rewrite `path` if it starts with the device prefix
    #[must_use]
    pub fn apply(&self, path: &str) -> Option<String> {
        path.strip_prefix(self.device.as_str())
            .map(|rest| format!("{}{rest}", self.host))
    }
}

impl FromStr for PathRule {
    type Err = CoverageError;

    fn from_str(s: &str) -> CoverageResult<Self> {
        let (device, host) = s.split_once('=').ok_or_else(|| {
            CoverageError::config(format!("invalid path mapping '{s}', expected device=host"))
        })?;
        Ok(Self::new(device, host))
    }
}

impl fmt::Display for PathRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.device, self.host)
    }
}

/// Ordered rules plus an optional source root for relative results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMapping {
    rules: Vec<PathRule>,
    source_root: Option<PathBuf>,
}

impl PathMapping {
    /// No rules, no source root
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule; earlier rules take precedence
    #[must_use]
    pub fn with_rule(mut self, rule: PathRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Join relative results under `root`
    #[must_use]
    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }

    /// Parse every `device=host` string
    ///
    /// # Errors
    ///
    /// Returns [`CoverageError::Config`] for the first string without `=`.
    pub fn parse_rules<S: AsRef<str>>(mut self, specs: &[S]) -> CoverageResult<Self> {
        for spec in specs {
            self.rules.push(spec.as_ref().parse()?);
        }
        Ok(self)
    }

    /// Configured rules, in precedence order
    #[must_use]
    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// Configured source root
    #[must_use]
    pub fn source_root(&self) -> Option<&Path> {
        self.source_root.as_deref()
    }

    /// Apply the first matching rule, without the source root
    #[must_use]
    pub fn rewrite(&self, path: &str) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.apply(path))
            .unwrap_or_else(|| path.to_string())
    }

    /// Host path for a reported path
    #[must_use]
    pub fn map(&self, path: &str) -> PathBuf {
        let mapped = PathBuf::from(self.rewrite(path));
        match &self.source_root {
            Some(root) if mapped.is_relative() => root.join(mapped),
            _ => mapped,
        }
    }
}
