//! Execution tracer
//!
//! A [`TraceSession`] is the host side of the runtime's line-level hook. The
//! runtime reports every call, line and return event together with the code
//! unit it belongs to; the session filters them and accumulates the executed
//! lines, optional executable lines and optional arcs of one run.
//!
//! ```
//! use mpycov::tracer::{CodeUnit, TraceConfig, TraceEvent, TraceSession};
//!
//! let mut session = TraceSession::new(TraceConfig::builder().collect_arcs(true).build());
//! let main = CodeUnit::new(1, "main.py", 1);
//!
//! session.start();
//! session.on_event(TraceEvent::Call, &main, 1);
//! session.on_event(TraceEvent::Line, &main, 1);
//! session.on_event(TraceEvent::Line, &main, 2);
//! session.on_event(TraceEvent::Return, &main, 2);
//! session.stop();
//!
//! let record = session.capture();
//! assert_eq!(record.executed["main.py"].to_vec(), vec![1, 2]);
//! ```

mod filter;

#[cfg(test)]
mod tests;

pub use filter::{is_tracer_module, PathFilter, TRACER_MODULES};

use crate::capture;
use crate::model::{Arc, CaptureRecord, FileArcs, FileLines, LineSet, RunMetadata};
use crate::result::CoverageResult;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::Path;

/// One entry of a code unit's line table: bytecode range `start..end` maps to `line`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    /// First bytecode offset
    pub start: u32,
    /// End bytecode offset (exclusive)
    pub end: u32,
    /// Source line, `None` for synthetic instructions
    pub line: Option<u32>,
}

impl LineRange {
    /// Create a line range
    #[must_use]
    pub const fn new(start: u32, end: u32, line: Option<u32>) -> Self {
        Self { start, end, line }
    }
}

/// A compiled code unit as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    /// Runtime identity of the code object
    pub id: u64,
    /// Path as reported by the runtime
    pub file: String,
    /// First line of the callable
    pub first_line: u32,
    /// The unit's own line table, when the runtime exposes it
    pub line_table: Option<Vec<LineRange>>,
}

impl CodeUnit {
    /// Create a code unit without line-table data
    #[must_use]
    pub fn new(id: u64, file: impl Into<String>, first_line: u32) -> Self {
        Self {
            id,
            file: file.into(),
            first_line,
            line_table: None,
        }
    }

    /// Attach line-table data
    #[must_use]
    pub fn with_line_table(mut self, table: Vec<LineRange>) -> Self {
        self.line_table = Some(table);
        self
    }
}

/// Hook event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    /// A frame was entered
    Call,
    /// A new line is about to execute in the current frame
    Line,
    /// The current frame is returning
    Return,
}

/// Tracer configuration
#[derive(Debug, Clone, Default)]
pub struct TraceConfig {
    /// File filter
    pub filter: PathFilter,
    /// Record the runtime's own executable lines
    pub collect_executable: bool,
    /// Record arcs
    pub collect_arcs: bool,
    /// Label stored in the capture metadata
    pub run_label: Option<String>,
}

impl TraceConfig {
    /// Create a builder for tracer config
    #[must_use]
    pub fn builder() -> TraceConfigBuilder {
        TraceConfigBuilder::default()
    }
}

/// Builder for [`TraceConfig`]
#[derive(Debug, Default)]
pub struct TraceConfigBuilder {
    include: Vec<String>,
    exclude: Vec<String>,
    collect_executable: bool,
    collect_arcs: bool,
    run_label: Option<String>,
}

impl TraceConfigBuilder {
    /// Add an include pattern
    #[must_use]
    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include.push(pattern.into());
        self
    }

    /// Add an exclude pattern
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude.push(pattern.into());
        self
    }

    /// Record executable lines from code-unit line tables
    #[must_use]
    pub fn collect_executable(mut self, enabled: bool) -> Self {
        self.collect_executable = enabled;
        self
    }

    /// Record arcs
    #[must_use]
    pub fn collect_arcs(mut self, enabled: bool) -> Self {
        self.collect_arcs = enabled;
        self
    }

    /// Set the run label
    #[must_use]
    pub fn run_label(mut self, label: impl Into<String>) -> Self {
        self.run_label = Some(label.into());
        self
    }

    /// Build the configuration
    #[must_use]
    pub fn build(self) -> TraceConfig {
        TraceConfig {
            filter: PathFilter::new(self.include, self.exclude),
            collect_executable: self.collect_executable,
            collect_arcs: self.collect_arcs,
            run_label: self.run_label,
        }
    }
}

/// Counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceStats {
    /// Events accepted by the filter
    pub events: u64,
    /// Distinct code units whose line tables were read
    pub code_units: u64,
    /// Arcs dropped because their endpoints were in different files
    pub dropped_arcs: u64,
}

#[derive(Debug)]
enum Frame {
    /// Frame of a filtered-out file; its events are not recorded
    Ignored,
    Traced {
        file: String,
        first_line: u32,
        last_line: u32,
        // No line event seen yet; the call line is already covered by the entry arc
        entered: bool,
    },
}

/// A tracing session for one run
#[derive(Debug)]
pub struct TraceSession {
    config: TraceConfig,
    active: bool,
    executed: HashMap<String, LineSet>,
    executable: HashMap<String, LineSet>,
    arcs: HashMap<String, BTreeSet<Arc>>,
    seen_units: HashSet<u64>,
    // One entry per live runtime frame entered since `start()`.
    frames: Vec<Frame>,
    stats: TraceStats,
}

impl TraceSession {
    /// Create an idle session
    #[must_use]
    pub fn new(config: TraceConfig) -> Self {
        Self {
            config,
            active: false,
            executed: HashMap::new(),
            executable: HashMap::new(),
            arcs: HashMap::new(),
            seen_units: HashSet::new(),
            frames: Vec::new(),
            stats: TraceStats::default(),
        }
    }

    /// Reset accumulated state and begin accepting events
    pub fn start(&mut self) {
        self.reset();
        self.active = true;
    }

    /// Stop accepting events; accumulated data is kept
    pub fn stop(&mut self) {
        self.active = false;
        self.frames.clear();
    }

    /// Discard all accumulated data
    pub fn reset(&mut self) {
        self.executed.clear();
        self.executable.clear();
        self.arcs.clear();
        self.seen_units.clear();
        self.frames.clear();
        self.stats = TraceStats::default();
    }

    /// Whether the session is accepting events
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active
    }

    /// Session configuration
    #[must_use]
    pub const fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Session counters
    #[must_use]
    pub const fn stats(&self) -> TraceStats {
        self.stats
    }

    /// Hook entry point: handle one runtime event at `line` of `unit`
    pub fn on_event(&mut self, event: TraceEvent, unit: &CodeUnit, line: u32) {
        if !self.active {
            return;
        }
        match event {
            TraceEvent::Call => self.on_call(unit, line),
            TraceEvent::Line => self.on_line(unit, line),
            TraceEvent::Return => self.on_return(unit),
        }
    }

    fn records(&self, file: &str) -> bool {
        !is_tracer_module(file) && self.config.filter.accepts(file)
    }

    fn on_call(&mut self, unit: &CodeUnit, line: u32) {
        if !self.records(&unit.file) {
            self.frames.push(Frame::Ignored);
            return;
        }
        self.stats.events += 1;

        if self.config.collect_executable && self.seen_units.insert(unit.id) {
            if let Some(table) = &unit.line_table {
                self.stats.code_units += 1;
                slot(&mut self.executable, &unit.file)
                    .extend(table.iter().filter_map(|range| range.line));
            }
        }

        if self.config.collect_arcs && line > 0 && unit.first_line > 0 {
            let _ = slot(&mut self.arcs, &unit.file).insert(Arc::entry(unit.first_line, line));
        }
        self.frames.push(Frame::Traced {
            file: unit.file.clone(),
            first_line: unit.first_line,
            last_line: line,
            entered: true,
        });
    }

    fn on_line(&mut self, unit: &CodeUnit, line: u32) {
        if line == 0 {
            return;
        }
        // Frames entered before `start()` have no slot; fall back to the filter.
        let accepted = match self.frames.last() {
            Some(Frame::Ignored) => false,
            Some(Frame::Traced { .. }) => true,
            None => self.records(&unit.file),
        };
        if !accepted {
            return;
        }
        self.stats.events += 1;
        let _ = slot(&mut self.executed, &unit.file).insert(line);

        if !self.config.collect_arcs {
            return;
        }
        if let Some(Frame::Traced {
            file,
            last_line,
            entered,
            ..
        }) = self.frames.last_mut()
        {
            let repeat_of_call = std::mem::take(entered) && *last_line == line;
            if *file == unit.file {
                if *last_line > 0 && !repeat_of_call {
                    let _ = slot(&mut self.arcs, &unit.file)
                        .insert(Arc::interior(*last_line, line));
                }
            } else {
                self.stats.dropped_arcs += 1;
                file.clone_from(&unit.file);
            }
            *last_line = line;
        }
    }

    fn on_return(&mut self, unit: &CodeUnit) {
        let Some(Frame::Traced {
            file,
            first_line,
            last_line,
            ..
        }) = self.frames.pop()
        else {
            return;
        };
        if !self.config.collect_arcs {
            return;
        }
        if file != unit.file {
            self.stats.dropped_arcs += 1;
            return;
        }
        if last_line > 0 && first_line > 0 {
            let _ = slot(&mut self.arcs, &file).insert(Arc::exit(last_line, first_line));
        }
    }

    /// Snapshot the accumulated data as a capture record
    #[must_use]
    pub fn capture(&self) -> CaptureRecord {
        let executable = self
            .config
            .collect_executable
            .then(|| to_file_lines(&self.executable));
        let arcs = self.config.collect_arcs.then(|| {
            self.arcs
                .iter()
                .map(|(file, arcs)| (file.clone(), arcs.clone()))
                .collect::<FileArcs>()
        });
        CaptureRecord {
            executed: to_file_lines(&self.executed),
            executable,
            arcs,
            metadata: self.config.run_label.clone().map(|label| RunMetadata {
                run_label: Some(label),
            }),
        }
    }

    /// Write the capture as JSON to `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn export_to_file(&self, path: &Path) -> CoverageResult<()> {
        capture::write_record(&self.capture(), path)
    }

    /// Write the capture framed between the sentinel lines
    ///
    /// # Errors
    ///
    /// Returns an error if the writer fails.
    pub fn export_framed<W: Write>(&self, writer: W) -> CoverageResult<()> {
        capture::write_framed(&self.capture(), writer)
    }
}

fn slot<'a, V: Default>(map: &'a mut HashMap<String, V>, file: &str) -> &'a mut V {
    map.entry(file.to_owned()).or_default()
}

fn to_file_lines(map: &HashMap<String, LineSet>) -> FileLines {
    map.iter()
        .map(|(file, lines)| (file.clone(), lines.clone()))
        .collect()
}
