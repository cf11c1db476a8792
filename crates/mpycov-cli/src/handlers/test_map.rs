//! Test-map command handler

use super::load_captures;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::TestMapArgs;
use mpycov::AttributionIndex;

/// Execute the test-map command
pub fn execute_test_map(config: &CliConfig, args: &TestMapArgs) -> CliResult<()> {
    let reporter = super::reporter(config);
    let captures = load_captures(config, &reporter)?;
    let index = AttributionIndex::from_captures(&captures, args.line_detail);
    if index.is_empty() {
        return Err(CliError::NoEntries);
    }
    print!("{}", index.to_csv());
    Ok(())
}
