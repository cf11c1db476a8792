//! mpycov: line and branch coverage for MicroPython programs
//!
//! MicroPython has no `settrace`-driven coverage tool of its own. mpycov
//! records what a run executed, decides independently what *could* have
//! executed, and hands both to a reporting engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌──────────┐
//! │  Tracer  │──►│ Capture  │──►│  Merge  │──►│ Path map │──►│ Resolver │──► report
//! │ (device) │   │  store   │   │ (union) │   │          │   │ mpy/ast/ │
//! └──────────┘   └──────────┘   └─────────┘   └──────────┘   │ co_lines │
//!                     │                                       └──────────┘
//!                     └──► attribution index
//! ```
//!
//! # Example
//!
//! ```
//! use mpycov::merge::merge;
//! use mpycov::model::CaptureRecord;
//!
//! let a: CaptureRecord = serde_json::from_str(r#"{"executed": {"app.py": [1, 3, 5]}}"#).unwrap();
//! let b: CaptureRecord = serde_json::from_str(r#"{"executed": {"app.py": [2, 3, 4]}}"#).unwrap();
//! let merged = merge(&[a, b]);
//! assert_eq!(merged.executed["app.py"].to_vec(), vec![1, 2, 3, 4, 5]);
//! ```

#![warn(missing_docs)]

pub mod attribution;
pub mod capture;
pub mod grammar;
pub mod merge;
pub mod model;
#[allow(clippy::cast_possible_truncation, clippy::missing_errors_doc)]
pub mod mpy;
pub mod pathmap;
pub mod report;
pub mod resolve;
mod result;
pub mod tracer;

pub use attribution::AttributionIndex;
pub use capture::{CaptureStore, StoredCapture, DEFAULT_DATA_DIR, END_SENTINEL, START_SENTINEL};
pub use grammar::{analyze, SourceAnalysis};
pub use merge::{merge, MergedRecord};
pub use model::{Arc, ArcEndpoint, CaptureRecord, FileArcs, FileLines, LineSet, RunMetadata};
pub use pathmap::{PathMapping, PathRule};
pub use report::{build_report, CoverageDocument, FileSummary, HandoffEngine, ReportEngine};
pub use resolve::{device_lines, Pathway, ResolutionMethod, ResolvedFile, Resolver};
pub use result::{CoverageError, CoverageResult, Warning};
pub use tracer::{CodeUnit, TraceConfig, TraceEvent, TraceSession};

/// Commonly used types
pub mod prelude {
    pub use super::capture::{extract_framed, parse_record, write_framed, CaptureStore};
    pub use super::merge::{merge, MergedRecord};
    pub use super::model::{Arc, CaptureRecord, LineSet};
    pub use super::mpy::{Compiler, MpyCross};
    pub use super::pathmap::PathMapping;
    pub use super::report::{build_report, HandoffEngine};
    pub use super::resolve::{ResolutionMethod, Resolver};
    pub use super::result::{CoverageError, CoverageResult, Warning};
    pub use super::tracer::{CodeUnit, TraceConfig, TraceEvent, TraceSession};
}
