//! Ingest command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::IngestArgs;
use mpycov::capture::extract_framed;
use mpycov::{CaptureRecord, CaptureStore};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Execute the ingest command
pub fn execute_ingest(config: &CliConfig, args: &IngestArgs) -> CliResult<()> {
    let reporter = super::reporter(config);
    let output = read_log(&args.log)?;
    let record = extract_framed(&output)?;
    let (record, label) = labelled(record, args.label.as_deref(), &args.log);

    let path = CaptureStore::new(&config.data_dir).save(&record, &label)?;
    reporter.success(&format!(
        "Saved {} ({} files, {} lines)",
        path.display(),
        record.file_count(),
        record.line_count()
    ));
    Ok(())
}

/// Read captured output; `-` is stdin
///
/// Serial logs may carry stray non-UTF-8 bytes around the payload, so those
/// are replaced rather than rejected.
pub fn read_log(path: &Path) -> CliResult<String> {
    let mut bytes = Vec::new();
    if path.as_os_str() == "-" {
        std::io::stdin().read_to_end(&mut bytes)?;
    } else {
        bytes = fs::read(path)?;
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Apply an explicit label and pick the name the capture is stored under
///
/// Label precedence: `label`, the label recorded by the tracer, then the log
/// file name.
#[must_use]
pub fn labelled(
    mut record: CaptureRecord,
    label: Option<&str>,
    log: &Path,
) -> (CaptureRecord, String) {
    if let Some(label) = label {
        record.metadata.get_or_insert_with(Default::default).run_label = Some(label.to_string());
    }
    let name = record.run_label().map_or_else(
        || {
            log.file_stem()
                .filter(|_| log.as_os_str() != "-")
                .map_or_else(|| "run".to_string(), |s| s.to_string_lossy().into_owned())
        },
        str::to_string,
    );
    (record, name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mpycov::RunMetadata;

    fn record(label: Option<&str>) -> CaptureRecord {
        let mut record: CaptureRecord =
            serde_json::from_str(r#"{"executed": {"main.py": [1, 2]}}"#).unwrap();
        if let Some(label) = label {
            record.metadata = Some(RunMetadata {
                run_label: Some(label.to_string()),
            });
        }
        record
    }

    #[test]
    fn test_explicit_label_wins() {
        let (record, name) = labelled(record(Some("traced")), Some("test_led"), Path::new("a.log"));
        assert_eq!(name, "test_led");
        assert_eq!(record.run_label(), Some("test_led"));
    }

    #[test]
    fn test_recorded_label_used() {
        let (_, name) = labelled(record(Some("test_uart")), None, Path::new("a.log"));
        assert_eq!(name, "test_uart");
    }

    #[test]
    fn test_log_name_fallback() {
        let (record, name) = labelled(record(None), None, Path::new("logs/serial_run.log"));
        assert_eq!(name, "serial_run");
        assert_eq!(record.run_label(), None);
    }

    #[test]
    fn test_stdin_fallback() {
        let (_, name) = labelled(record(None), None, Path::new("-"));
        assert_eq!(name, "run");
    }

    #[test]
    fn test_read_log_tolerates_bad_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("serial.log");
        fs::write(&path, b"boot\xff\xfe\n---MPY_COV_START---\n").unwrap();
        let text = read_log(&path).unwrap();
        assert!(text.contains("---MPY_COV_START---"));
    }
}
