//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use mpycov::ResolutionMethod;
use std::path::PathBuf;

/// mpycov: line and branch coverage for MicroPython programs
#[derive(Parser, Debug)]
#[command(name = "mpycov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Directory holding coverage data files [default: .mpy_coverage]
    #[arg(long, global = true, env = "MPYCOV_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file [default: ./mpycov.yaml when present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract a coverage payload from captured program output and store it
    Ingest(IngestArgs),

    /// Merge all stored coverage data into one record
    Merge(MergeArgs),

    /// Generate a merged coverage report
    Report(ReportArgs),

    /// Print the executable lines of source files
    Statements(StatementsArgs),

    /// List collected coverage data files
    List,

    /// Show which tests cover each application file
    TestMap(TestMapArgs),

    /// Remove collected coverage data
    Clean(CleanArgs),
}

/// Arguments for the ingest command
#[derive(Parser, Debug)]
pub struct IngestArgs {
    /// Captured stdout or serial log ("-" for stdin)
    pub log: PathBuf,

    /// Run label used for the stored file name and test attribution
    #[arg(short, long)]
    pub label: Option<String>,
}

/// Arguments for the merge command
#[derive(Parser, Debug)]
pub struct MergeArgs {
    /// Write the merged record here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the report command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ReportArgs {
    /// Executable line detection method [default: auto]
    #[arg(long)]
    pub method: Option<MethodArg>,

    /// Root directory for source files
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Path to the mpy-cross binary
    #[arg(long)]
    pub mpy_cross: Option<PathBuf>,

    /// Path mapping device_prefix=host_prefix (repeatable)
    #[arg(long = "path-map", value_name = "DEVICE=HOST")]
    pub path_map: Vec<String>,

    /// Only report files whose path contains this (repeatable)
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip files whose path contains this (repeatable)
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Write the JSON report document here
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Show missing line numbers in the text report
    #[arg(long)]
    pub show_missing: bool,

    /// Enable branch coverage reporting
    #[arg(long)]
    pub branch: bool,
}

/// Arguments for the statements command
#[derive(Parser, Debug)]
pub struct StatementsArgs {
    /// Python source files (glob patterns are expanded)
    #[arg(required = true)]
    pub files: Vec<String>,

    /// Analysis method
    #[arg(long, default_value = "mpy")]
    pub method: StatementsMethod,

    /// Directory to resolve relative file paths from
    #[arg(long)]
    pub source_root: Option<PathBuf>,

    /// Path to the mpy-cross binary
    #[arg(long)]
    pub mpy_cross: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the test-map command
#[derive(Parser, Debug)]
pub struct TestMapArgs {
    /// Show per-line test associations instead of file-level
    #[arg(long)]
    pub line_detail: bool,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

/// Resolution method argument
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MethodArg {
    /// Decoder, then device data, then grammar per file
    Auto,
    /// Executable lines reported by the runtime
    #[value(name = "co_lines", alias = "co-lines")]
    CoLines,
    /// Source grammar analysis
    Ast,
    /// Decode mpy-cross bytecode line tables
    Mpy,
}

impl From<MethodArg> for ResolutionMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Auto => Self::Auto,
            MethodArg::CoLines => Self::CoLines,
            MethodArg::Ast => Self::Ast,
            MethodArg::Mpy => Self::Mpy,
        }
    }
}

/// Method argument of the statements command
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatementsMethod {
    /// Decode mpy-cross bytecode line tables
    #[default]
    Mpy,
    /// Source grammar analysis
    Ast,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_list_command() {
            let cli = Cli::parse_from(["mpycov", "list"]);
            assert!(matches!(cli.command, Commands::List));
            assert!(cli.data_dir.is_none());
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli = Cli::parse_from(["mpycov", "list", "--data-dir", "cov", "-vv", "--color", "never"]);
            assert_eq!(cli.data_dir, Some(PathBuf::from("cov")));
            assert_eq!(cli.verbose, 2);
            assert!(matches!(cli.color, ColorArg::Never));
        }

        #[test]
        fn test_subcommand_required() {
            assert!(Cli::try_parse_from(["mpycov"]).is_err());
        }
    }

    mod report_tests {
        use super::*;

        #[test]
        fn test_parse_report_defaults() {
            let cli = Cli::parse_from(["mpycov", "report"]);
            let Commands::Report(args) = cli.command else {
                panic!("expected Report command");
            };
            assert!(args.method.is_none());
            assert!(args.path_map.is_empty());
            assert!(!args.branch);
            assert!(!args.show_missing);
        }

        #[test]
        fn test_parse_report_full() {
            let cli = Cli::parse_from([
                "mpycov",
                "report",
                "--method",
                "co_lines",
                "--path-map",
                "/flash/=",
                "--path-map",
                "/lib/=vendor/",
                "--source-root",
                "fw",
                "--show-missing",
                "--branch",
                "-o",
                "cov.json",
            ]);
            let Commands::Report(args) = cli.command else {
                panic!("expected Report command");
            };
            assert_eq!(args.method, Some(MethodArg::CoLines));
            assert_eq!(args.path_map, vec!["/flash/=", "/lib/=vendor/"]);
            assert_eq!(args.source_root, Some(PathBuf::from("fw")));
            assert_eq!(args.output, Some(PathBuf::from("cov.json")));
            assert!(args.branch && args.show_missing);
        }

        #[test]
        fn test_unknown_method_rejected() {
            assert!(Cli::try_parse_from(["mpycov", "report", "--method", "bytecode"]).is_err());
        }

        #[test]
        fn test_method_conversion() {
            for (arg, method) in [
                (MethodArg::Auto, ResolutionMethod::Auto),
                (MethodArg::CoLines, ResolutionMethod::CoLines),
                (MethodArg::Ast, ResolutionMethod::Ast),
                (MethodArg::Mpy, ResolutionMethod::Mpy),
            ] {
                assert_eq!(ResolutionMethod::from(arg), method);
            }
        }
    }

    mod other_command_tests {
        use super::*;

        #[test]
        fn test_parse_statements() {
            let cli = Cli::parse_from(["mpycov", "statements", "a.py", "b.py", "--method", "ast", "--json"]);
            let Commands::Statements(args) = cli.command else {
                panic!("expected Statements command");
            };
            assert_eq!(args.files, vec!["a.py", "b.py"]);
            assert_eq!(args.method, StatementsMethod::Ast);
            assert!(args.json);
        }

        #[test]
        fn test_statements_requires_files() {
            assert!(Cli::try_parse_from(["mpycov", "statements"]).is_err());
        }

        #[test]
        fn test_parse_ingest_with_label() {
            let cli = Cli::parse_from(["mpycov", "ingest", "run.log", "--label", "test_led"]);
            let Commands::Ingest(args) = cli.command else {
                panic!("expected Ingest command");
            };
            assert_eq!(args.log, PathBuf::from("run.log"));
            assert_eq!(args.label.as_deref(), Some("test_led"));
        }

        #[test]
        fn test_parse_clean_short_yes() {
            let cli = Cli::parse_from(["mpycov", "clean", "-y"]);
            assert!(matches!(cli.command, Commands::Clean(CleanArgs { yes: true })));
        }

        #[test]
        fn test_parse_test_map() {
            let cli = Cli::parse_from(["mpycov", "test-map", "--line-detail"]);
            assert!(matches!(
                cli.command,
                Commands::TestMap(TestMapArgs { line_detail: true })
            ));
        }
    }
}
