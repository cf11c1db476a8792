//! Merge command handler

use super::{load_captures, merged_summary};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::MergeArgs;
use mpycov::MergedRecord;
use std::fs;

/// Execute the merge command
pub fn execute_merge(config: &CliConfig, args: &MergeArgs) -> CliResult<()> {
    let reporter = super::reporter(config);
    let captures = load_captures(config, &reporter)?;
    reporter.info(&format!(
        "Merging {} data file(s) from {}",
        captures.len(),
        config.data_dir.display()
    ));

    let merged: MergedRecord = captures.iter().map(|c| &c.record).collect();
    reporter.info(&merged_summary(&merged));

    let json = merged.to_json_pretty()?;
    match args.output {
        Some(ref path) => {
            fs::write(path, json + "\n")?;
            reporter.success(&format!("Merged record written to {}", path.display()));
        }
        None => println!("{json}"),
    }
    Ok(())
}
