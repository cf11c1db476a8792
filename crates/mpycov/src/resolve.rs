//! Resolution orchestrator
//!
//! Picks, per file, the pathway that decides which lines *could* execute:
//!
//! | Method     | Pathway                                        |
//! |------------|------------------------------------------------|
//! | `mpy`      | compile with `mpy-cross`, decode line tables   |
//! | `ast`      | grammar-level statement scan of the source     |
//! | `co_lines` | executable lines reported by the device itself |
//! | `auto`     | `mpy`, falling back per file to `co_lines` then `ast` |
//!
//! Files are keyed by the path the runtime reported; the path mapping only
//! decides where the source is read from.

use crate::grammar;
use crate::model::{CaptureRecord, FileLines, LineSet};
use crate::mpy::{self, Compiler, MpyCross};
use crate::pathmap::PathMapping;
use crate::result::{CoverageError, CoverageResult, Warning};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How executable lines are determined
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Bytecode line tables only
    Mpy,
    /// Grammar scan only
    Ast,
    /// Device-reported executable lines only
    CoLines,
    /// Bytecode first, with per-file fallback
    #[default]
    Auto,
}

impl ResolutionMethod {
    /// All methods, in CLI order
    pub const ALL: [Self; 4] = [Self::Auto, Self::CoLines, Self::Ast, Self::Mpy];

    /// Name used on the command line and in config files
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mpy => "mpy",
            Self::Ast => "ast",
            Self::CoLines => "co_lines",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionMethod {
    type Err = CoverageError;

    fn from_str(s: &str) -> CoverageResult<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                CoverageError::config(format!(
                    "unknown method '{s}' (expected auto, co_lines, ast or mpy)"
                ))
            })
    }
}

/// Pathway that produced a file's statements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pathway {
    /// `.mpy` line tables plus definition-line compensation
    Decoder,
    /// Grammar-level statement scan
    Grammar,
    /// Executable lines captured on the device
    Device,
}

impl Pathway {
    /// Method name that selects this pathway alone
    #[must_use]
    pub const fn method(self) -> ResolutionMethod {
        match self {
            Self::Decoder => ResolutionMethod::Mpy,
            Self::Grammar => ResolutionMethod::Ast,
            Self::Device => ResolutionMethod::CoLines,
        }
    }
}

impl fmt::Display for Pathway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// Statements of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    /// Path as reported by the runtime
    pub reported: String,
    /// Host path the source was read from
    pub source: PathBuf,
    /// Lines that could execute
    pub statements: LineSet,
    /// Pathway that produced `statements`
    pub pathway: Pathway,
}

/// Output of a resolution batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Files with a non-empty statement set, in input order
    pub files: Vec<ResolvedFile>,
    /// Files skipped or resolved through a fallback
    pub warnings: Vec<Warning>,
}

/// Device pathway input: for each file, the executable set of the last
/// capture that carries one
#[must_use]
pub fn device_lines(records: &[CaptureRecord]) -> FileLines {
    let mut out = FileLines::new();
    for executable in records.iter().filter_map(|r| r.executable.as_ref()) {
        for (file, lines) in executable {
            let _ = out.insert(file.clone(), lines.clone());
        }
    }
    out
}

/// Runs the configured pathway over a batch of files
pub struct Resolver {
    method: ResolutionMethod,
    mapping: PathMapping,
    compiler: Box<dyn Compiler + Send + Sync>,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("method", &self.method)
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ResolutionMethod::default())
    }
}

impl Resolver {
    /// Resolver using `mpy-cross` from `PATH`
    #[must_use]
    pub fn new(method: ResolutionMethod) -> Self {
        Self {
            method,
            mapping: PathMapping::new(),
            compiler: Box::new(MpyCross::new()),
        }
    }

    /// Set the path mapping
    #[must_use]
    pub fn with_mapping(mut self, mapping: PathMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Replace the compiler used by the decoder pathway
    #[must_use]
    pub fn with_compiler(mut self, compiler: impl Compiler + Send + Sync + 'static) -> Self {
        self.compiler = Box::new(compiler);
        self
    }

    /// Configured method
    #[must_use]
    pub const fn method(&self) -> ResolutionMethod {
        self.method
    }

    /// Configured path mapping
    #[must_use]
    pub const fn mapping(&self) -> &PathMapping {
        &self.mapping
    }

    /// Resolve every file in `files`
    ///
    /// # Errors
    ///
    /// Only unrecoverable failures, such as a missing compiler, are errors.
    /// Everything scoped to one file becomes a warning.
    pub fn resolve<'a, I>(&self, files: I, device: &FileLines) -> CoverageResult<Resolution>
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.resolve_with_progress(files, device, |_| {})
    }

    /// Like [`Resolver::resolve`], calling `progress` before each file
    ///
    /// # Errors
    ///
    /// See [`Resolver::resolve`].
    pub fn resolve_with_progress<'a, I, F>(
        &self,
        files: I,
        device: &FileLines,
        mut progress: F,
    ) -> CoverageResult<Resolution>
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&str),
    {
        let mut resolution = Resolution::default();
        for reported in files {
            progress(reported);
            let source = self.mapping.map(reported);
            let outcome = self.resolve_file(reported, &source, device, &mut resolution.warnings)?;
            match outcome {
                Some((statements, pathway)) if !statements.is_empty() => {
                    debug!(file = reported, %pathway, statements = statements.len(), "resolved");
                    resolution.files.push(ResolvedFile {
                        reported: reported.to_string(),
                        source,
                        statements,
                        pathway,
                    });
                }
                _ => debug!(file = reported, "no statements; excluded"),
            }
        }
        info!(
            method = %self.method,
            files = resolution.files.len(),
            warnings = resolution.warnings.len(),
            "resolution finished"
        );
        Ok(resolution)
    }

    fn resolve_file(
        &self,
        reported: &str,
        source: &Path,
        device: &FileLines,
        warnings: &mut Vec<Warning>,
    ) -> CoverageResult<Option<(LineSet, Pathway)>> {
        let device_set = device.get(reported).filter(|lines| !lines.is_empty());
        if self.method == ResolutionMethod::CoLines && device_set.is_none() {
            return Ok(None);
        }
        if !source.exists() {
            push_warning(warnings, reported, format!("source not found: {}", source.display()));
            return Ok(None);
        }

        match self.method {
            ResolutionMethod::CoLines => Ok(device_set.map(|lines| (lines.clone(), Pathway::Device))),
            ResolutionMethod::Ast => Ok(grammar_pathway(source)
                .map_err(|e| push_warning(warnings, reported, e.to_string()))
                .ok()
                .map(|lines| (lines, Pathway::Grammar))),
            ResolutionMethod::Mpy => match self.decoder_pathway(source, warnings)? {
                Ok(lines) => Ok(Some((lines, Pathway::Decoder))),
                Err(e) => {
                    push_warning(warnings, reported, e.to_string());
                    Ok(None)
                }
            },
            ResolutionMethod::Auto => {
                let failure = match self.decoder_pathway(source, warnings)? {
                    Ok(lines) => return Ok(Some((lines, Pathway::Decoder))),
                    Err(e) => e,
                };
                if let Some(lines) = device_set {
                    push_warning(warnings, reported, format!("{failure}; falling back to co_lines"));
                    return Ok(Some((lines.clone(), Pathway::Device)));
                }
                match grammar_pathway(source) {
                    Ok(lines) => {
                        push_warning(warnings, reported, format!("{failure}; falling back to ast"));
                        Ok(Some((lines, Pathway::Grammar)))
                    }
                    Err(e) => {
                        push_warning(
                            warnings,
                            reported,
                            format!("{failure}; ast fallback failed: {e}"),
                        );
                        Ok(None)
                    }
                }
            }
        }
    }

    /// Outer error: fatal; inner error: scoped to this file
    fn decoder_pathway(
        &self,
        source: &Path,
        warnings: &mut Vec<Warning>,
    ) -> CoverageResult<Result<LineSet, CoverageError>> {
        match mpy::executable_lines(self.compiler.as_ref(), source) {
            Ok(decoded) => {
                warnings.extend(decoded.warnings);
                Ok(Ok(decoded.lines))
            }
            Err(e) if e.is_recoverable() => Ok(Err(e)),
            Err(e) => Err(e),
        }
    }
}

fn grammar_pathway(source: &Path) -> CoverageResult<LineSet> {
    let subject = source.display().to_string();
    let text = fs::read_to_string(source)
        .map_err(|e| CoverageError::compile_failure(subject.as_str(), e.to_string()))?;
    grammar::statement_lines(&text).map_err(|e| CoverageError::compile_failure(subject, e.to_string()))
}

fn push_warning(warnings: &mut Vec<Warning>, subject: &str, message: String) {
    warn!(file = subject, "{message}");
    warnings.push(Warning::new(subject, message));
}
