//! Multi-run merge
//!
//! Unions executed lines and arcs across captures. Executable lines are never
//! merged: they describe the code, not a run, and are read from one capture by
//! the resolver.

use crate::model::{CaptureRecord, FileArcs, FileLines};
use serde::{Deserialize, Serialize};

/// Per-file union of many captures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRecord {
    /// Executed lines per file
    #[serde(default)]
    pub executed: FileLines,
    /// Observed arcs per file
    #[serde(default, skip_serializing_if = "FileArcs::is_empty")]
    pub arcs: FileArcs,
}

impl MergedRecord {
    /// Empty merge
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one capture into this merge
    pub fn absorb(&mut self, record: &CaptureRecord) {
        for (file, lines) in &record.executed {
            self.executed.entry(file.clone()).or_default().union_with(lines);
        }
        for (file, arcs) in record.arcs.iter().flatten() {
            self.arcs
                .entry(file.clone())
                .or_default()
                .extend(arcs.iter().copied());
        }
    }

    /// Fold another merge into this one
    pub fn combine(&mut self, other: &MergedRecord) {
        for (file, lines) in &other.executed {
            self.executed.entry(file.clone()).or_default().union_with(lines);
        }
        for (file, arcs) in &other.arcs {
            self.arcs
                .entry(file.clone())
                .or_default()
                .extend(arcs.iter().copied());
        }
    }

    /// Files present in the merge, sorted
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.executed.keys().map(String::as_str)
    }

    /// Number of distinct executed lines over all files
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.executed.values().map(crate::model::LineSet::len).sum()
    }

    /// Canonical JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Indented JSON text
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl<'a> FromIterator<&'a CaptureRecord> for MergedRecord {
    fn from_iter<I: IntoIterator<Item = &'a CaptureRecord>>(iter: I) -> Self {
        let mut merged = Self::new();
        for record in iter {
            merged.absorb(record);
        }
        merged
    }
}

/// Merge many captures
#[must_use]
pub fn merge(records: &[CaptureRecord]) -> MergedRecord {
    records.iter().collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{Arc, LineSet};
    use std::collections::BTreeSet;

    fn record(file: &str, lines: &[u32]) -> CaptureRecord {
        let mut record = CaptureRecord::default();
        record
            .executed
            .insert(file.to_string(), lines.iter().copied().collect());
        record
    }

    #[test]
    fn test_union_law() {
        let merged = merge(&[record("a.py", &[1, 3, 5]), record("a.py", &[2, 3, 4])]);
        assert_eq!(merged.executed["a.py"].to_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_disjoint_files_kept() {
        let merged = merge(&[record("a.py", &[1]), record("b.py", &[2])]);
        assert_eq!(merged.files().collect::<Vec<_>>(), vec!["a.py", "b.py"]);
        assert_eq!(merged.line_count(), 2);
    }

    #[test]
    fn test_executable_not_merged() {
        let mut first = record("a.py", &[1]);
        first.executable = Some(
            [("a.py".to_string(), LineSet::from_iter([1, 2, 3]))]
                .into_iter()
                .collect(),
        );
        let merged = merge(&[first]);
        let json = merged.to_json().unwrap();
        assert!(!json.contains("executable"));
    }

    #[test]
    fn test_arcs_unioned() {
        let mut first = record("a.py", &[1, 2]);
        first.arcs = Some(
            [(
                "a.py".to_string(),
                BTreeSet::from([Arc::entry(1, 1), Arc::interior(1, 2)]),
            )]
            .into_iter()
            .collect(),
        );
        let mut second = record("a.py", &[1, 3]);
        second.arcs = Some(
            [(
                "a.py".to_string(),
                BTreeSet::from([Arc::entry(1, 1), Arc::interior(1, 3)]),
            )]
            .into_iter()
            .collect(),
        );

        let merged = merge(&[first, second]);
        assert_eq!(merged.arcs["a.py"].len(), 3);
    }

    #[test]
    fn test_arcs_omitted_when_absent() {
        let merged = merge(&[record("a.py", &[1])]);
        assert_eq!(merged.to_json().unwrap(), r#"{"executed":{"a.py":[1]}}"#);
    }

    #[test]
    fn test_empty_input() {
        let merged = merge(&[]);
        assert!(merged.executed.is_empty());
        assert_eq!(merged.line_count(), 0);
    }

    #[test]
    fn test_combine_matches_flat_merge() {
        let records = [record("a.py", &[1]), record("a.py", &[2]), record("b.py", &[7])];
        let mut left = merge(&records[..1]);
        left.combine(&merge(&records[1..]));
        assert_eq!(left, merge(&records));
    }
}
