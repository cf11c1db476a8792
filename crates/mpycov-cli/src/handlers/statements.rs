//! Statements command handler

use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::{StatementsArgs, StatementsMethod};
use mpycov::grammar::statement_lines;
use mpycov::model::LineSet;
use mpycov::mpy::{executable_lines, Compiler};
use mpycov::{CoverageError, CoverageResult, Warning};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Execute the statements command
pub fn execute_statements(config: &CliConfig, args: &StatementsArgs) -> CliResult<()> {
    let reporter = super::reporter(config);
    let files = expand_patterns(&args.files)?;
    let root = config.source_root(args.source_root.as_deref());
    let compiler = config.compiler(args.mpy_cross.as_deref());

    let mut results = BTreeMap::new();
    let mut failed = 0;
    for file in &files {
        let path = match root {
            Some(ref root) if Path::new(file).is_relative() => root.join(file),
            _ => PathBuf::from(file),
        };
        match analyze_file(args.method, &compiler, &path) {
            Ok((lines, warnings)) => {
                reporter.warnings(&warnings);
                results.insert(file.clone(), lines);
            }
            Err(err @ CoverageError::ToolMissing { .. }) => return Err(err.into()),
            Err(err) => {
                reporter.warning(&err.to_string());
                failed += 1;
            }
        }
    }

    print!("{}", render_statements(&results, args.json)?);
    if failed > 0 {
        return Err(CliError::Incomplete {
            failed,
            total: files.len(),
        });
    }
    Ok(())
}

/// Statement lines of one file plus non-fatal warnings
pub fn analyze_file<C: Compiler + ?Sized>(
    method: StatementsMethod,
    compiler: &C,
    path: &Path,
) -> CoverageResult<(LineSet, Vec<Warning>)> {
    let subject = path.display().to_string();
    if !path.is_file() {
        return Err(CoverageError::compile_failure(subject, "source not found"));
    }
    match method {
        StatementsMethod::Mpy => {
            let decoded = executable_lines(compiler, path)?;
            Ok((decoded.lines, decoded.warnings))
        }
        StatementsMethod::Ast => {
            let source = fs::read_to_string(path)?;
            let lines = statement_lines(&source)
                .map_err(|e| CoverageError::compile_failure(subject, e.to_string()))?;
            Ok((lines, Vec::new()))
        }
    }
}

/// Expand glob patterns; plain arguments pass through untouched
pub fn expand_patterns(args: &[String]) -> CliResult<Vec<String>> {
    let mut files = Vec::new();
    for arg in args {
        if !arg.contains(&['*', '?', '['][..]) {
            files.push(arg.clone());
            continue;
        }
        let before = files.len();
        let paths = glob::glob(arg)
            .map_err(|e| CliError::invalid_argument(format!("bad pattern {arg}: {e}")))?;
        for path in paths {
            let path = path.map_err(glob::GlobError::into_error)?;
            files.push(path.display().to_string());
        }
        if files.len() == before {
            return Err(CliError::invalid_argument(format!("no files match {arg}")));
        }
    }
    Ok(files)
}

/// Render results as text or JSON
pub fn render_statements(results: &BTreeMap<String, LineSet>, json: bool) -> CliResult<String> {
    if json {
        let plain: BTreeMap<&str, Vec<u32>> = results
            .iter()
            .map(|(file, lines)| (file.as_str(), lines.to_vec()))
            .collect();
        return Ok(serde_json::to_string_pretty(&plain)? + "\n");
    }
    let mut out = String::new();
    for (file, lines) in results {
        let lines = lines.to_vec();
        out.push_str(&format!("{file}:\n  {} executable lines: {lines:?}\n", lines.len()));
    }
    Ok(out)
}
