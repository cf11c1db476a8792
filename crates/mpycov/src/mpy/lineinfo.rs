//! Bytecode line-table decoding
//!
//! Each entry advances the bytecode offset and the source line:
//!
//! ```text
//! 0LLBBBBB            line += L (0..=3),    bytecode += B (0..=31)
//! 1LLLBBBB LLLLLLLL   line += L (0..=2047), bytecode += B (0..=15)
//! ```
//!
//! The high line bits of the two-byte form live in the first byte; the low
//! eight in the second.

use super::reader::{DecodeError, DecodeResult, RawCode};
use crate::model::LineSet;

/// One decoded line-table step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineStep {
    /// Bytecode bytes covered by this step
    pub bytecode_delta: u32,
    /// Source lines advanced by this step
    pub line_delta: u32,
}

/// Iterator over the steps of an encoded line table
#[derive(Debug, Clone)]
pub struct LineSteps<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LineSteps<'a> {
    /// Iterate `data`
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Iterator for LineSteps<'_> {
    type Item = DecodeResult<LineStep>;

    fn next(&mut self) -> Option<Self::Item> {
        let c = u32::from(*self.data.get(self.pos)?);
        if c & 0x80 == 0 {
            self.pos += 1;
            return Some(Ok(LineStep {
                bytecode_delta: c & 0x1f,
                line_delta: c >> 5,
            }));
        }
        let Some(&low) = self.data.get(self.pos + 1) else {
            let offset = self.pos + 1;
            self.pos = self.data.len();
            return Some(Err(DecodeError::Truncated { offset }));
        };
        self.pos += 2;
        Some(Ok(LineStep {
            bytecode_delta: c & 0xf,
            line_delta: ((c << 4) & 0x700) | u32::from(low),
        }))
    }
}

/// Lines recorded by one function's line table
///
/// The running line starts at 1. A step records the resulting line when it
/// advances the bytecode or the line.
pub fn table_lines(data: &[u8], lines: &mut LineSet) -> DecodeResult<()> {
    let mut line: u32 = 1;
    for step in LineSteps::new(data) {
        let step = step?;
        line = line.saturating_add(step.line_delta);
        if step.bytecode_delta > 0 || step.line_delta > 0 {
            let _ = lines.insert(line);
        }
    }
    Ok(())
}

/// Lines recorded by `raw` and every function nested in it
pub fn raw_code_lines(raw: &RawCode) -> DecodeResult<LineSet> {
    let mut lines = LineSet::new();
    for code in raw.walk() {
        table_lines(code.line_info(), &mut lines)?;
    }
    Ok(lines)
}
