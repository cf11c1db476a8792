//! Capture serialization
//!
//! A capture travels either as a JSON file or framed between two sentinel
//! lines inside the runtime's stdout (or a device serial log), where it is
//! surrounded by whatever else the program printed.

mod store;

pub use store::{CaptureStore, StoreEntry, StoredCapture, DEFAULT_DATA_DIR, label_from_storage_id};

use crate::model::CaptureRecord;
use crate::result::{CoverageError, CoverageResult};
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::Path;

/// Line printed before the payload
pub const START_SENTINEL: &str = "---MPY_COV_START---";

/// Line printed after the payload
pub const END_SENTINEL: &str = "---MPY_COV_END---";

/// Identifier used in errors for payloads that came from an output stream
const STREAM_ID: &str = "<output>";

fn frame_pattern() -> CoverageResult<Regex> {
    let pattern = format!(
        r"(?s){}\s*(.*?)\s*{}",
        regex::escape(START_SENTINEL),
        regex::escape(END_SENTINEL)
    );
    Regex::new(&pattern).map_err(|e| CoverageError::config(e.to_string()))
}

/// Serialize a record to its canonical JSON text
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json(record: &CaptureRecord) -> CoverageResult<String> {
    Ok(serde_json::to_string(record)?)
}

/// Write `record` framed between the sentinel lines
///
/// # Errors
///
/// Returns an error if the writer fails.
pub fn write_framed<W: Write>(record: &CaptureRecord, mut writer: W) -> CoverageResult<()> {
    writeln!(writer, "{START_SENTINEL}")?;
    writeln!(writer, "{}", to_json(record)?)?;
    writeln!(writer, "{END_SENTINEL}")?;
    writer.flush()?;
    Ok(())
}

/// Extract the framed payload from noisy output
///
/// The first framed payload wins.
///
/// # Errors
///
/// Returns [`CoverageError::NoCaptureData`] when the sentinels are absent and
/// [`CoverageError::MalformedCapture`] when the payload is not a valid record.
pub fn extract_framed(output: &str) -> CoverageResult<CaptureRecord> {
    let payload = frame_pattern()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(CoverageError::NoCaptureData {
            start: START_SENTINEL,
            end: END_SENTINEL,
        })?;
    parse_record(payload, STREAM_ID)
}

/// Parse a stored record, framed or whole-file JSON
///
/// # Errors
///
/// Returns [`CoverageError::MalformedCapture`] naming `id` on failure.
pub fn parse_record(text: &str, id: &str) -> CoverageResult<CaptureRecord> {
    if text.contains(START_SENTINEL) {
        return match extract_framed(text) {
            Err(CoverageError::MalformedCapture { message, .. }) => {
                Err(CoverageError::malformed_capture(id, message))
            }
            Err(CoverageError::NoCaptureData { .. }) => Err(CoverageError::malformed_capture(
                id,
                format!("start marker without {END_SENTINEL}"),
            )),
            other => other,
        };
    }
    serde_json::from_str(text.trim()).map_err(|e| CoverageError::malformed_capture(id, e.to_string()))
}

/// Write a record as JSON to `path`
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_record(record: &CaptureRecord, path: &Path) -> CoverageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, to_json(record)?)?;
    Ok(())
}

/// Read a record from `path`
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read, or
/// [`CoverageError::MalformedCapture`] if it does not parse.
pub fn read_record(path: &Path) -> CoverageResult<CaptureRecord> {
    let text = fs::read_to_string(path)?;
    parse_record(&text, &file_id(path))
}

/// File name of `path`, used to name records in warnings
pub(crate) fn file_id(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
