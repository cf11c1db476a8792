//! Bytecode line-table pathway
//!
//! Compiles a source file with `mpy-cross`, reads the resulting `.mpy`
//! container natively and collects every line recorded in the line tables of
//! the module and all nested functions and classes.
//!
//! Line tables start at the first body line of a definition, so the `def` and
//! `class` lines never appear in them. [`executable_lines`] adds them back
//! from a grammar scan of the same source.

pub mod builder;
mod compiler;
mod lineinfo;
mod reader;

pub use compiler::{CompiledUnit, Compiler, MpyCross, DEFAULT_COMPILE_TIMEOUT, DEFAULT_MPY_CROSS};
pub use lineinfo::{raw_code_lines, table_lines, LineStep, LineSteps};
pub use reader::{
    ByteReader, Constant, DecodeError, DecodeResult, Header, MpyFile, Prelude, Qstr, RawCode,
    MPY_VERSION,
};

use crate::grammar;
use crate::model::LineSet;
use crate::result::{CoverageError, CoverageResult, Warning};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Decoded lines of one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedFile {
    /// Executable lines, including compensated definition lines
    pub lines: LineSet,
    /// Non-fatal problems, such as a failed compensation scan
    pub warnings: Vec<Warning>,
}

/// Lines recorded in the line tables of a compiled unit
///
/// # Errors
///
/// Returns [`CoverageError::CompileFailure`] if the image cannot be decoded.
pub fn decoded_lines(unit: &CompiledUnit) -> CoverageResult<LineSet> {
    let file = unit.parse()?;
    raw_code_lines(&file.raw_code)
        .map_err(|e| CoverageError::compile_failure(unit.source.display().to_string(), e.to_string()))
}

/// Add the declaration line of every definition in `source` to `lines`
///
/// # Errors
///
/// Returns the scanner's message when `source` cannot be tokenized.
pub fn compensate(lines: &mut LineSet, source: &str) -> Result<(), String> {
    let analysis = grammar::analyze(source).map_err(|e| e.to_string())?;
    lines.union_with(&analysis.definitions);
    Ok(())
}

/// Executable lines of `source` through the bytecode pathway
///
/// # Errors
///
/// [`CoverageError::ToolMissing`] if the compiler is absent, otherwise
/// [`CoverageError::CompileFailure`] scoped to this file.
pub fn executable_lines<C: Compiler + ?Sized>(
    compiler: &C,
    source: &Path,
) -> CoverageResult<DecodedFile> {
    let unit = compiler.compile(source)?;
    let mut lines = decoded_lines(&unit)?;
    let mut warnings = Vec::new();

    let subject = source.display().to_string();
    let compensated = fs::read_to_string(source)
        .map_err(|e| e.to_string())
        .and_then(|text| compensate(&mut lines, &text));
    if let Err(message) = compensated {
        warn!(file = %subject, error = %message, "definition-line compensation failed");
        warnings.push(Warning::new(
            subject,
            format!("definition-line compensation failed: {message}"),
        ));
    }

    Ok(DecodedFile { lines, warnings })
}
