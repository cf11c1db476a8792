//! CLI configuration
//!
//! Settings come from three layers, later ones winning: built-in defaults,
//! an optional `mpycov.yaml`, then command-line flags.

use crate::error::{CliError, CliResult};
use mpycov::mpy::MpyCross;
use mpycov::tracer::PathFilter;
use mpycov::{PathMapping, ResolutionMethod, DEFAULT_DATA_DIR};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "mpycov.yaml";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - errors only
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - library progress on stderr
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Default `tracing` filter when `RUST_LOG` is unset
    ///
    /// Recoverable problems already reach the user through the reporter, so
    /// library warnings stay hidden unless asked for.
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet | Self::Normal => "error",
            Self::Verbose => "mpycov=info,mpycov_cli=info",
            Self::Debug => "mpycov=debug,mpycov_cli=debug",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when stderr is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// Contents of `mpycov.yaml`
///
/// ```yaml
/// data_dir: build/coverage
/// method: mpy
/// source_root: firmware
/// mpy_cross: tools/mpy-cross
/// path_map:
///   - /flash/=
/// exclude:
///   - tests/
/// compile_timeout_secs: 60
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Capture store directory
    pub data_dir: Option<PathBuf>,
    /// Statement resolution method
    pub method: Option<ResolutionMethod>,
    /// Host directory holding the sources
    pub source_root: Option<PathBuf>,
    /// `mpy-cross` binary
    pub mpy_cross: Option<PathBuf>,
    /// `device=host` prefix rules
    pub path_map: Vec<String>,
    /// Only report files whose path contains one of these
    pub include: Vec<String>,
    /// Never report files whose path contains one of these
    pub exclude: Vec<String>,
    /// Per-file compiler timeout
    pub compile_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Parse a config file
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            CliError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }

    /// Parse config text; an empty document is the default config
    pub fn parse(text: &str) -> CliResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Load `explicit`, or `mpycov.yaml` in `dir` when it exists
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> CliResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "using config file");
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Capture store directory
    pub data_dir: PathBuf,
    /// Values from the config file
    pub file: FileConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Normal,
            color: ColorChoice::Auto,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            file: FileConfig::default(),
        }
    }
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Apply a config file; its `data_dir` replaces the default
    #[must_use]
    pub fn with_file_config(mut self, file: FileConfig) -> Self {
        if let Some(ref dir) = file.data_dir {
            self.data_dir.clone_from(dir);
        }
        self.file = file;
        self
    }

    /// Set the capture store directory
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Resolution method: flag, then file, then `auto`
    #[must_use]
    pub fn method(&self, flag: Option<ResolutionMethod>) -> ResolutionMethod {
        flag.or(self.file.method).unwrap_or_default()
    }

    /// Source root: flag, then file
    #[must_use]
    pub fn source_root(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.file.source_root.clone())
    }

    /// Path mapping with command-line rules ahead of file rules
    pub fn path_mapping(&self, rules: &[String], root: Option<&Path>) -> CliResult<PathMapping> {
        let mut mapping = PathMapping::new()
            .parse_rules(rules)?
            .parse_rules(&self.file.path_map)?;
        if let Some(root) = self.source_root(root) {
            mapping = mapping.with_source_root(root);
        }
        Ok(mapping)
    }

    /// Cross compiler: flag binary, then file binary, then `mpy-cross` on `PATH`
    #[must_use]
    pub fn compiler(&self, binary: Option<&Path>) -> MpyCross {
        let mut compiler = MpyCross::new();
        if let Some(binary) = binary.or(self.file.mpy_cross.as_deref()) {
            compiler = compiler.with_binary(binary);
        }
        if let Some(secs) = self.file.compile_timeout_secs {
            compiler = compiler.with_timeout(Duration::from_secs(secs));
        }
        compiler
    }

    /// Report filter from command-line and file patterns
    #[must_use]
    pub fn filter(&self, include: &[String], exclude: &[String]) -> PathFilter {
        let join = |flags: &[String], file: &[String]| {
            flags.iter().chain(file).cloned().collect::<Vec<_>>()
        };
        PathFilter::new(
            join(include, &self.file.include),
            join(exclude, &self.file.exclude),
        )
    }
}
