//! mpycov: MicroPython coverage from the command line
//!
//! ## Usage
//!
//! ```bash
//! micropython test_led.py > run.log          # program traced by the runtime module
//! mpycov ingest run.log --label test_led     # store the framed capture
//! mpycov report --path-map /flash/= --show-missing
//! mpycov test-map --line-detail              # which test hit which line
//! ```

use clap::Parser;
use mpycov_cli::{
    handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, FileConfig, Verbosity,
};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();

    // Build configuration from CLI args and the config file
    let config = build_config(&cli)?;
    init_tracing(config.verbosity);

    match cli.command {
        Commands::Ingest(args) => handlers::execute_ingest(&config, &args),
        Commands::Merge(args) => handlers::execute_merge(&config, &args),
        Commands::Report(args) => handlers::execute_report(&config, &args),
        Commands::Statements(args) => handlers::execute_statements(&config, &args),
        Commands::List => handlers::execute_list(&config),
        Commands::TestMap(args) => handlers::execute_test_map(&config, &args),
        Commands::Clean(args) => handlers::execute_clean(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliResult<CliConfig> {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };

    let color: ColorChoice = cli.color.clone().into();
    console::set_colors_enabled_stderr(color.should_color());

    let file = FileConfig::discover(cli.config.as_deref(), Path::new("."))?;
    let mut config = CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_file_config(file);
    if let Some(ref dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

/// Log to stderr; `RUST_LOG` overrides the verbosity flags
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
