//! Command handlers - extracted from main.rs for testability
//!
//! Each handler module contains the `execute_*` entry point for one command
//! plus the pure rendering helpers it prints through.

pub mod clean;
pub mod ingest;
pub mod list;
pub mod merge;
pub mod report;
pub mod statements;
pub mod test_map;

pub use clean::execute_clean;
pub use ingest::execute_ingest;
pub use list::execute_list;
pub use merge::execute_merge;
pub use report::execute_report;
pub use statements::execute_statements;
pub use test_map::execute_test_map;

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use mpycov::{CaptureStore, MergedRecord, StoredCapture};

/// Reporter honoring the configured color and quiet settings
#[must_use]
pub fn reporter(config: &CliConfig) -> ProgressReporter {
    ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet())
}

/// Every readable capture in the data directory
///
/// Unreadable files are reported and skipped. A directory without any data
/// file is an error.
pub fn load_captures(
    config: &CliConfig,
    reporter: &ProgressReporter,
) -> CliResult<Vec<StoredCapture>> {
    let store = CaptureStore::new(&config.data_dir);
    let (captures, warnings) = store.load_all()?;
    reporter.warnings(&warnings);
    if captures.is_empty() && warnings.is_empty() {
        return Err(CliError::empty_store(&config.data_dir));
    }
    Ok(captures)
}

/// One-line description of a merge result
#[must_use]
pub fn merged_summary(merged: &MergedRecord) -> String {
    format!(
        "Merged: {} files, {} executed lines",
        merged.executed.len(),
        merged.line_count()
    )
}
