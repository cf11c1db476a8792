//! Grammar-level statement resolver
//!
//! Computes the statement lines of a Python source file directly from its
//! text, using the same counting rules as the reporting engine:
//!
//! - a statement counts at the first physical line of its logical line
//! - compound headers count; bare `else:` and `finally:` clauses do not
//! - docstrings (a string literal opening a module, class or function body)
//!   do not count; any other bare expression, `...` included, does
//! - `global` and `nonlocal` declarations do not count
//! - lines carrying the exclusion pragma are dropped, together with the block
//!   they open
//!
//! Definition lines (`def`, `async def`, `class`) are reported separately so
//! the bytecode pathway can add them back.

mod lexer;
#[cfg(test)]
mod tests;

pub use lexer::{scan, GrammarError, LogicalLine, Scan, Token};

use crate::model::LineSet;
use regex::Regex;
use std::collections::BTreeSet;

/// Default exclusion pragma
pub const DEFAULT_EXCLUDE: &str = r"#\s*(pragma|PRAGMA)[:\s]?\s*(no|NO)\s*(cover|COVER)";

/// Result of scanning one source file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceAnalysis {
    /// Lines that count as statements
    pub statements: LineSet,
    /// `def`/`class` keyword lines, pragmas notwithstanding
    pub definitions: LineSet,
    /// Physical lines removed by the exclusion pragma
    pub excluded: LineSet,
}

/// Analyze `source` with the default exclusion pragma
///
/// # Errors
///
/// Returns a [`GrammarError`] when the source cannot be tokenized.
pub fn analyze(source: &str) -> Result<SourceAnalysis, GrammarError> {
    analyze_with(source, DEFAULT_EXCLUDE)
}

/// Analyze `source`, excluding lines whose comment matches `exclude`
///
/// # Errors
///
/// Returns a [`GrammarError`] when the source cannot be tokenized or the
/// pattern is not a valid regex.
pub fn analyze_with(source: &str, exclude: &str) -> Result<SourceAnalysis, GrammarError> {
    let pragma = Regex::new(exclude).map_err(|e| GrammarError::Pattern(e.to_string()))?;
    let scan = lexer::scan(source)?;

    let marked: BTreeSet<u32> = scan
        .comments
        .iter()
        .filter(|(_, text)| pragma.is_match(text))
        .map(|(line, _)| *line)
        .collect();

    let mut out = SourceAnalysis::default();
    // Indentation of an excluded block header; deeper lines are excluded too
    let mut excluded_block: Option<usize> = None;
    let mut excluded_decorator = false;
    // Next logical line opens a module, class or function body
    let mut body_start = true;

    for line in &scan.lines {
        let docstring_slot = body_start;
        body_start = is_definition(line) && line.opens_block();

        if is_definition(line) {
            let _ = out.definitions.insert(line.first_line);
        }

        if let Some(level) = excluded_block {
            if line.indent > level {
                out.excluded.extend(line.lines());
                continue;
            }
            excluded_block = None;
        }

        if excluded_decorator || line.lines().any(|n| marked.contains(&n)) {
            out.excluded.extend(line.lines());
            if line.opens_block() {
                excluded_block = Some(line.indent);
            }
            excluded_decorator = is_decorator(line);
            continue;
        }

        if is_statement(line) && !(docstring_slot && is_docstring(line)) {
            let _ = out.statements.insert(line.first_line);
        }
    }

    Ok(out)
}

/// Statement lines of `source` with the default pragma
///
/// # Errors
///
/// Returns a [`GrammarError`] when the source cannot be tokenized.
pub fn statement_lines(source: &str) -> Result<LineSet, GrammarError> {
    analyze(source).map(|analysis| analysis.statements)
}

fn is_definition(line: &LogicalLine) -> bool {
    line.keyword()
        .is_some_and(|t| t.is_name("def") || t.is_name("class"))
}

fn is_decorator(line: &LogicalLine) -> bool {
    line.tokens.first() == Some(&Token::Op('@'))
}

fn is_statement(line: &LogicalLine) -> bool {
    let Some(first) = line.tokens.first() else {
        return false;
    };
    if (first.is_name("else") || first.is_name("finally")) && line.opens_block() {
        return false;
    }
    !(first.is_name("global") || first.is_name("nonlocal"))
}

/// Plain string literals only; implicit concatenation included
fn is_docstring(line: &LogicalLine) -> bool {
    line.tokens
        .iter()
        .all(|t| matches!(t, Token::Str { formatted: false }))
}
