//! Durable capture storage: one JSON file per run in a data directory

use super::{file_id, parse_record, to_json};
use crate::model::CaptureRecord;
use crate::result::{CoverageResult, Warning};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = ".mpy_coverage";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Derive a run label from a storage id such as `20240131_093000_test_led.json`
///
/// The `YYYYMMDD_HHMMSS_` prefix is removed when present, then the `.json`
/// suffix.
#[must_use]
pub fn label_from_storage_id(id: &str) -> String {
    let bytes = id.as_bytes();
    let stem = if bytes.len() > 21 && bytes[8] == b'_' && bytes[15] == b'_' {
        id.get(16..).unwrap_or(id)
    } else {
        id
    };
    stem.strip_suffix(".json").unwrap_or(stem).to_string()
}

/// A record loaded from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCapture {
    /// File name inside the data directory
    pub id: String,
    /// Full path
    pub path: PathBuf,
    /// Parsed record
    pub record: CaptureRecord,
}

impl StoredCapture {
    /// Run label: metadata first, then the storage id
    #[must_use]
    pub fn label(&self) -> String {
        self.record
            .run_label()
            .map_or_else(|| label_from_storage_id(&self.id), str::to_string)
    }
}

/// One line of a store listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    /// File name inside the data directory
    pub id: String,
    /// `(files, lines)` executed, or why the record could not be read
    pub summary: Result<(usize, usize), String>,
}

/// A directory of capture files
#[derive(Debug, Clone)]
pub struct CaptureStore {
    dir: PathBuf,
}

impl CaptureStore {
    /// Open a store rooted at `dir`; nothing is created until the first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Data directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths of all stored captures, sorted by file name
    ///
    /// A missing directory is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be read.
    pub fn paths(&self) -> CoverageResult<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(paths)
    }

    /// Persist `record` as `YYYYMMDD_HHMMSS_<label>.json`
    ///
    /// `label` may be a script path; only its stem is used. An existing file
    /// of the same name is never overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, record: &CaptureRecord, label: &str) -> CoverageResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stem = Path::new(label)
            .file_stem()
            .map_or_else(|| "run".to_string(), |s| s.to_string_lossy().into_owned());
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);

        let mut path = self.dir.join(format!("{timestamp}_{stem}.json"));
        let mut n = 1;
        while path.exists() {
            path = self.dir.join(format!("{timestamp}_{stem}-{n}.json"));
            n += 1;
        }

        let mut text = to_json(record)?;
        text.push('\n');
        fs::write(&path, text)?;
        debug!(path = %path.display(), "saved capture");
        Ok(path)
    }

    /// List stored captures with their executed file and line counts
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self) -> CoverageResult<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        for path in self.paths()? {
            let id = file_id(&path);
            let summary = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| parse_record(&text, &id).map_err(|e| e.to_string()))
                .map(|record| (record.file_count(), record.line_count()));
            entries.push(StoreEntry { id, summary });
        }
        Ok(entries)
    }

    /// Load every stored capture, skipping unreadable ones with a warning
    ///
    /// # Errors
    ///
    /// Returns an error only if the directory itself cannot be read.
    pub fn load_all(&self) -> CoverageResult<(Vec<StoredCapture>, Vec<Warning>)> {
        let mut captures = Vec::new();
        let mut warnings = Vec::new();
        for path in self.paths()? {
            let id = file_id(&path);
            let loaded = fs::read_to_string(&path)
                .map_err(Into::into)
                .and_then(|text| parse_record(&text, &id));
            match loaded {
                Ok(record) => captures.push(StoredCapture { id, path, record }),
                Err(err) => {
                    warn!(record = %id, error = %err, "skipping capture");
                    warnings.push(Warning::from_error(id, &err));
                }
            }
        }
        debug!(
            loaded = captures.len(),
            skipped = warnings.len(),
            dir = %self.dir.display(),
            "loaded captures"
        );
        Ok((captures, warnings))
    }

    /// Remove all stored captures, then the directory if it is left empty
    ///
    /// # Errors
    ///
    /// Returns an error if a capture file cannot be removed.
    pub fn clean(&self) -> CoverageResult<usize> {
        let paths = self.paths()?;
        for path in &paths {
            fs::remove_file(path)?;
        }
        // Fails when other files remain; the directory is then kept.
        let _ = fs::remove_dir(&self.dir);
        Ok(paths.len())
    }
}

impl Default for CaptureStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}
