//! mpycov CLI library
//!
//! Command-line interface over the `mpycov` library: ingest captured runs,
//! merge them, resolve statements and report.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)] // String building is clear and correct
#![allow(clippy::missing_errors_doc)] // Error types are self-documenting

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    CleanArgs, Cli, ColorArg, Commands, IngestArgs, MergeArgs, MethodArg, ReportArgs,
    StatementsArgs, StatementsMethod, TestMapArgs,
};
pub use config::{CliConfig, ColorChoice, FileConfig, Verbosity, DEFAULT_CONFIG_FILE};
pub use error::{CliError, CliResult};
pub use output::{format_percent, ProgressReporter};
