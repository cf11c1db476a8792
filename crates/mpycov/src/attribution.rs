//! Test attribution
//!
//! Answers "which runs touched this file (or line)?" from the stored captures.
//! Each capture contributes its label: the `run_label` metadata when present,
//! otherwise a name derived from the storage id.

use crate::capture::StoredCapture;
use crate::model::CaptureRecord;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

/// Labels by file, and optionally by file and line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributionIndex {
    files: BTreeMap<String, BTreeSet<String>>,
    lines: Option<BTreeMap<String, BTreeMap<u32, BTreeSet<String>>>>,
}

impl AttributionIndex {
    /// Empty file-level index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty index that also tracks individual lines
    #[must_use]
    pub fn with_line_detail() -> Self {
        Self {
            files: BTreeMap::new(),
            lines: Some(BTreeMap::new()),
        }
    }

    /// Record every executed line of `record` under `label`
    pub fn add(&mut self, label: &str, record: &CaptureRecord) {
        for (file, executed) in &record.executed {
            let _ = self
                .files
                .entry(file.clone())
                .or_default()
                .insert(label.to_string());

            if let Some(lines) = self.lines.as_mut() {
                let per_line = lines.entry(file.clone()).or_default();
                for line in executed.iter() {
                    let _ = per_line.entry(line).or_default().insert(label.to_string());
                }
            }
        }
    }

    /// Build from stored captures, labelling each by metadata or storage id
    #[must_use]
    pub fn from_captures(captures: &[StoredCapture], line_detail: bool) -> Self {
        let mut index = if line_detail {
            Self::with_line_detail()
        } else {
            Self::new()
        };
        for capture in captures {
            index.add(&capture.label(), &capture.record);
        }
        index
    }

    /// Whether any file was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether line detail is tracked
    #[must_use]
    pub fn has_line_detail(&self) -> bool {
        self.lines.is_some()
    }

    /// Labels that executed anything in `file`
    #[must_use]
    pub fn labels_for_file(&self, file: &str) -> Option<&BTreeSet<String>> {
        self.files.get(file)
    }

    /// Labels that executed `line` of `file`; `None` without line detail
    #[must_use]
    pub fn labels_for_line(&self, file: &str, line: u32) -> Option<&BTreeSet<String>> {
        self.lines.as_ref()?.get(file)?.get(&line)
    }

    /// `(file, label)` rows: files lexicographic, then labels
    pub fn file_rows(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().flat_map(|(file, labels)| {
            labels.iter().map(move |label| (file.as_str(), label.as_str()))
        })
    }

    /// `(file, line, label)` rows: files lexicographic, lines ascending, then labels
    pub fn line_rows(&self) -> impl Iterator<Item = (&str, u32, &str)> {
        self.lines.iter().flatten().flat_map(|(file, lines)| {
            lines.iter().flat_map(move |(line, labels)| {
                labels
                    .iter()
                    .map(move |label| (file.as_str(), *line, label.as_str()))
            })
        })
    }

    /// Space-aligned CSV; line rows when line detail is tracked
    #[must_use]
    pub fn to_csv(&self) -> String {
        if self.has_line_detail() {
            let rows: Vec<Vec<String>> = self
                .line_rows()
                .map(|(file, line, label)| vec![file.to_string(), line.to_string(), label.to_string()])
                .collect();
            aligned_csv(&["app_file", "line", "test"], &rows)
        } else {
            let rows: Vec<Vec<String>> = self
                .file_rows()
                .map(|(file, label)| vec![file.to_string(), label.to_string()])
                .collect();
            aligned_csv(&["app_file", "test"], &rows)
        }
    }
}

/// Pad every column to its widest cell and join cells with `", "`
#[must_use]
pub fn aligned_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    write_row(&mut out, headers, &widths);
    for row in rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        write_row(&mut out, &cells, &widths);
    }
    out
}

fn write_row(out: &mut String, cells: &[&str], widths: &[usize]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "{}", line.trim_end());
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::RunMetadata;
    use std::path::PathBuf;

    fn record(entries: &[(&str, &[u32])]) -> CaptureRecord {
        let mut record = CaptureRecord::default();
        for (file, lines) in entries {
            record
                .executed
                .insert((*file).to_string(), lines.iter().copied().collect());
        }
        record
    }

    fn stored(id: &str, label: Option<&str>, record: CaptureRecord) -> StoredCapture {
        let mut record = record;
        record.metadata = label.map(|l| RunMetadata {
            run_label: Some(l.to_string()),
        });
        StoredCapture {
            id: id.to_string(),
            path: PathBuf::from(id),
            record,
        }
    }

    #[test]
    fn test_file_level() {
        let mut index = AttributionIndex::new();
        index.add("test_b", &record(&[("app.py", &[1, 2])]));
        index.add("test_a", &record(&[("app.py", &[2]), ("lib.py", &[5])]));

        let rows: Vec<_> = index.file_rows().collect();
        assert_eq!(
            rows,
            vec![("app.py", "test_a"), ("app.py", "test_b"), ("lib.py", "test_a")]
        );
        assert!(index.labels_for_line("app.py", 2).is_none());
    }

    #[test]
    fn test_line_level() {
        let mut index = AttributionIndex::with_line_detail();
        index.add("t1", &record(&[("app.py", &[3, 1])]));
        index.add("t2", &record(&[("app.py", &[1])]));

        let rows: Vec<_> = index.line_rows().collect();
        assert_eq!(
            rows,
            vec![("app.py", 1, "t1"), ("app.py", 1, "t2"), ("app.py", 3, "t1")]
        );
        assert_eq!(index.labels_for_line("app.py", 1).unwrap().len(), 2);
    }

    #[test]
    fn test_label_from_metadata_or_storage_id() {
        let captures = vec![
            stored("20240101_120000_test_led.json", None, record(&[("a.py", &[1])])),
            stored(
                "20240101_120001_x.json",
                Some("test_button"),
                record(&[("a.py", &[1])]),
            ),
        ];
        let index = AttributionIndex::from_captures(&captures, false);
        let labels: Vec<_> = index.labels_for_file("a.py").unwrap().iter().collect();
        assert_eq!(labels, vec!["test_button", "test_led"]);
    }

    #[test]
    fn test_csv_alignment() {
        let mut index = AttributionIndex::new();
        index.add("t", &record(&[("main.py", &[1])]));
        index.add("longer_test", &record(&[("a.py", &[1])]));

        let csv = index.to_csv();
        assert_eq!(
            csv,
            "app_file, test\n\
             a.py    , longer_test\n\
             main.py , t\n"
        );
    }

    #[test]
    fn test_line_csv_header() {
        let mut index = AttributionIndex::with_line_detail();
        index.add("t", &record(&[("a.py", &[12])]));
        assert_eq!(index.to_csv(), "app_file, line, test\na.py    , 12  , t\n");
    }

    #[test]
    fn test_empty_index() {
        let index = AttributionIndex::new();
        assert!(index.is_empty());
        assert_eq!(index.to_csv(), "app_file, test\n");
    }
}
