//! Report-engine handoff
//!
//! The final rendering (text tables, HTML, XML, LCOV) belongs to an external
//! reporting engine. This module defines what is handed to it per file and
//! ships [`HandoffEngine`], which checks each source and assembles a
//! machine-readable [`CoverageDocument`].

use crate::merge::MergedRecord;
use crate::model::{Arc, LineSet};
use crate::resolve::{Pathway, Resolution};
use crate::result::{CoverageError, CoverageResult, Warning};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Per-file input to a report engine
#[derive(Debug, Clone, Copy)]
pub struct FileCoverage<'a> {
    /// Path as reported by the runtime
    pub reported: &'a str,
    /// Host source path
    pub source: &'a Path,
    /// Resolved statements
    pub statements: &'a LineSet,
    /// Merged executed lines
    pub executed: &'a LineSet,
    /// Merged arcs, when collected
    pub arcs: Option<&'a BTreeSet<Arc>>,
    /// Pathway that resolved `statements`
    pub pathway: Pathway,
}

/// Per-file result of a report engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSummary {
    /// Path as reported by the runtime
    pub file: String,
    /// Host source path
    pub source_path: String,
    /// Pathway that resolved the statements
    pub pathway: Pathway,
    /// Statement lines
    pub statements: LineSet,
    /// Executed statement lines
    pub executed: LineSet,
    /// Statement lines never executed
    pub missing: LineSet,
    /// Observed arcs, when branch data was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arcs: Option<Vec<Arc>>,
    /// `100 * executed / statements`
    pub percent: f64,
}

/// Something that turns resolved statements plus executed data into summaries
pub trait ReportEngine {
    /// Analyze one file
    ///
    /// # Errors
    ///
    /// A rejected file is an error scoped to that file; the caller records a
    /// warning and continues.
    fn analyze(&mut self, file: FileCoverage<'_>) -> CoverageResult<FileSummary>;
}

/// Totals over all reported files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Statement count
    pub statements: usize,
    /// Executed statement count
    pub executed: usize,
    /// Missing statement count
    pub missing: usize,
    /// `100 * executed / statements`, 0.0 without statements
    pub percent: f64,
}

/// The handoff document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageDocument {
    /// One entry per reported file, in resolution order
    pub files: Vec<FileSummary>,
    /// Totals
    pub totals: Totals,
}

impl CoverageDocument {
    /// Build from summaries, computing totals
    ///
    /// Only executed lines that are also statements count as hits.
    #[must_use]
    pub fn new(files: Vec<FileSummary>) -> Self {
        let statements: usize = files.iter().map(|f| f.statements.len()).sum();
        let executed: usize = files
            .iter()
            .map(|f| f.executed.intersection(&f.statements).len())
            .sum();
        Self {
            files,
            totals: Totals {
                statements,
                executed,
                missing: statements - executed,
                percent: percent(executed, statements),
            },
        }
    }

    /// Indented JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CoverageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON document to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> CoverageResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()? + "\n")?;
        Ok(())
    }
}

/// `100 * hit / total`, 0.0 when `total` is zero
#[must_use]
pub fn percent(hit: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let ratio = hit as f64 / total as f64;
        100.0 * ratio
    }
}

/// Compact line ranges such as `3-5, 9`
#[must_use]
pub fn format_ranges(lines: &LineSet) -> String {
    let mut parts = Vec::new();
    let mut iter = lines.iter().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            let _ = iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(", ")
}

/// Engine that emits the JSON handoff document
#[derive(Debug, Clone, Default)]
pub struct HandoffEngine {
    include_arcs: bool,
}

impl HandoffEngine {
    /// Line data only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include observed arcs in each summary
    #[must_use]
    pub fn with_arcs(mut self, include: bool) -> Self {
        self.include_arcs = include;
        self
    }
}

impl ReportEngine for HandoffEngine {
    fn analyze(&mut self, file: FileCoverage<'_>) -> CoverageResult<FileSummary> {
        // The renderer reads the source to annotate it
        fs::metadata(file.source)
            .map_err(|e| CoverageError::compile_failure(file.source.display().to_string(), e.to_string()))?;

        let executed = file.statements.intersection(file.executed);
        let missing = file.statements.difference(file.executed);
        Ok(FileSummary {
            file: file.reported.to_string(),
            source_path: file.source.display().to_string(),
            pathway: file.pathway,
            percent: percent(executed.len(), file.statements.len()),
            statements: file.statements.clone(),
            executed,
            missing,
            arcs: self
                .include_arcs
                .then(|| file.arcs.map(|a| a.iter().copied().collect()).unwrap_or_default()),
        })
    }
}

/// Outcome of a report run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportOutcome {
    /// Handoff document
    pub document: CoverageDocument,
    /// Files the engine rejected
    pub warnings: Vec<Warning>,
}

/// Feed every resolved file through `engine`
#[must_use]
pub fn build_report<E: ReportEngine + ?Sized>(
    resolution: &Resolution,
    merged: &MergedRecord,
    engine: &mut E,
) -> ReportOutcome {
    let empty = LineSet::new();
    let mut files = Vec::with_capacity(resolution.files.len());
    let mut warnings = Vec::new();

    for resolved in &resolution.files {
        let input = FileCoverage {
            reported: &resolved.reported,
            source: &resolved.source,
            statements: &resolved.statements,
            executed: merged.executed.get(&resolved.reported).unwrap_or(&empty),
            arcs: merged.arcs.get(&resolved.reported),
            pathway: resolved.pathway,
        };
        match engine.analyze(input) {
            Ok(summary) => files.push(summary),
            Err(e) => {
                warn!(file = %resolved.reported, error = %e, "report engine rejected file");
                warnings.push(Warning::from_error(resolved.reported.as_str(), &e));
            }
        }
    }

    ReportOutcome {
        document: CoverageDocument::new(files),
        warnings,
    }
}
