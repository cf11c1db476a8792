//! List command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use mpycov::capture::StoreEntry;
use mpycov::CaptureStore;
use std::path::Path;

/// Execute the list command
pub fn execute_list(config: &CliConfig) -> CliResult<()> {
    let entries = CaptureStore::new(&config.data_dir).list()?;
    print!("{}", render_listing(&config.data_dir, &entries));
    Ok(())
}

/// Render a store listing
#[must_use]
pub fn render_listing(dir: &Path, entries: &[StoreEntry]) -> String {
    if entries.is_empty() {
        return format!("No coverage data files in {}\n", dir.display());
    }
    let mut out = format!("Coverage data in {}:\n", dir.display());
    for entry in entries {
        match entry.summary {
            Ok((files, lines)) => {
                out.push_str(&format!("  {}  ({files} files, {lines} lines)\n", entry.id));
            }
            Err(ref e) => out.push_str(&format!("  {}  (error: {e})\n", entry.id)),
        }
    }
    out
}
