//! Clean command handler

use crate::config::CliConfig;
use crate::error::CliResult;
use crate::CleanArgs;
use mpycov::CaptureStore;
use std::io::{self, BufRead, Write};

/// Execute the clean command
pub fn execute_clean(config: &CliConfig, args: &CleanArgs) -> CliResult<()> {
    let store = CaptureStore::new(&config.data_dir);
    let count = store.paths()?.len();
    if count == 0 {
        println!("No coverage data files in {}", config.data_dir.display());
        return Ok(());
    }

    if !args.yes {
        print!("Remove {count} file(s) from {}? [y/N] ", config.data_dir.display());
        io::stdout().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !confirmed(&answer) {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = store.clean()?;
    println!("Removed {removed} file(s).");
    Ok(())
}

/// Whether a prompt answer means yes
#[must_use]
pub fn confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
