//! Tracer session tests
//!
//! Events are fed in the order the runtime delivers them: `Call` at the
//! callable's first line, one `Line` per executed line, `Return` at the last
//! executed line.

#![allow(clippy::unwrap_used, clippy::redundant_clone)]

use super::*;
use crate::model::ArcEndpoint;

fn unit(id: u64, file: &str, first_line: u32) -> CodeUnit {
    CodeUnit::new(id, file, first_line)
}

/// Replay a call of `code` that executes `lines` and returns
fn run_call(session: &mut TraceSession, code: &CodeUnit, lines: &[u32]) {
    session.on_event(TraceEvent::Call, code, code.first_line);
    for &line in lines {
        session.on_event(TraceEvent::Line, code, line);
    }
    let last = lines.last().copied().unwrap_or(code.first_line);
    session.on_event(TraceEvent::Return, code, last);
}

fn arcs_of(record: &CaptureRecord, file: &str) -> Vec<(i64, i64)> {
    record.arcs.as_ref().unwrap()[file]
        .iter()
        .map(|a| a.to_signed())
        .collect()
}

// ============================================================================
// Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_events_ignored_before_start() {
        let mut session = TraceSession::new(TraceConfig::default());
        run_call(&mut session, &unit(1, "main.py", 1), &[1, 2]);
        assert!(session.capture().executed.is_empty());
        assert!(!session.is_active());
    }

    #[test]
    fn test_stop_without_start_is_harmless() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.stop();
        session.stop();
        assert!(!session.is_active());
    }

    #[test]
    fn test_restart_resets_state() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.start();
        run_call(&mut session, &unit(1, "main.py", 1), &[1, 2]);
        session.start();
        run_call(&mut session, &unit(1, "main.py", 1), &[5]);
        session.stop();

        let record = session.capture();
        assert_eq!(record.executed["main.py"].to_vec(), vec![5]);
        assert_eq!(session.stats().events, 2);
    }

    #[test]
    fn test_data_kept_after_stop() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.start();
        run_call(&mut session, &unit(1, "main.py", 1), &[1]);
        session.stop();
        run_call(&mut session, &unit(1, "main.py", 1), &[9]);
        assert_eq!(session.capture().executed["main.py"].to_vec(), vec![1]);
    }

    #[test]
    fn test_unbalanced_return_does_not_panic() {
        let mut session = TraceSession::new(TraceConfig::builder().collect_arcs(true).build());
        session.start();
        let code = unit(1, "main.py", 1);
        session.on_event(TraceEvent::Return, &code, 3);
        session.on_event(TraceEvent::Return, &code, 3);
        session.on_event(TraceEvent::Line, &code, 4);
        assert_eq!(session.capture().executed["main.py"].to_vec(), vec![4]);
    }

    #[test]
    fn test_run_label_lands_in_metadata() {
        let mut session =
            TraceSession::new(TraceConfig::builder().run_label("test_led").build());
        session.start();
        assert_eq!(session.capture().run_label(), Some("test_led"));
    }
}

// ============================================================================
// Filtering
// ============================================================================

mod filter_tests {
    use super::*;

    #[test]
    fn test_excluded_frame_records_nothing() {
        let config = TraceConfig::builder().exclude("lib/").build();
        let mut session = TraceSession::new(config);
        session.start();
        run_call(&mut session, &unit(1, "lib/util.py", 1), &[2, 3]);
        run_call(&mut session, &unit(2, "main.py", 1), &[1]);

        let record = session.capture();
        assert!(!record.executed.contains_key("lib/util.py"));
        assert!(record.executed.contains_key("main.py"));
    }

    #[test]
    fn test_tracer_module_never_traced() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.start();
        run_call(&mut session, &unit(1, "/lib/mpy_coverage.py", 1), &[10]);
        assert!(session.capture().executed.is_empty());
    }

    #[test]
    fn test_include_substring() {
        let config = TraceConfig::builder().include("foo").build();
        let mut session = TraceSession::new(config);
        session.start();
        run_call(&mut session, &unit(1, "bar_foo_baz.py", 1), &[1]);
        run_call(&mut session, &unit(2, "foobar.py", 1), &[1]);
        run_call(&mut session, &unit(3, "other.py", 1), &[1]);

        let files: Vec<_> = session.capture().executed.into_keys().collect();
        assert_eq!(files, vec!["bar_foo_baz.py", "foobar.py"]);
    }
}

// ============================================================================
// Executable lines from code-unit line tables
// ============================================================================

mod executable_tests {
    use super::*;

    fn with_table(id: u64, first_line: u32, lines: &[Option<u32>]) -> CodeUnit {
        let table = lines
            .iter()
            .enumerate()
            .map(|(i, &line)| LineRange::new(i as u32 * 2, i as u32 * 2 + 2, line))
            .collect();
        unit(id, "app.py", first_line).with_line_table(table)
    }

    #[test]
    fn test_positive_lines_collected() {
        let config = TraceConfig::builder().collect_executable(true).build();
        let mut session = TraceSession::new(config);
        session.start();
        run_call(&mut session, &with_table(1, 1, &[Some(1), None, Some(3), Some(0)]), &[1]);

        let record = session.capture();
        assert_eq!(record.executable.unwrap()["app.py"].to_vec(), vec![1, 3]);
    }

    #[test]
    fn test_units_deduplicated_by_identity() {
        let config = TraceConfig::builder().collect_executable(true).build();
        let mut session = TraceSession::new(config);
        session.start();
        let outer = with_table(1, 1, &[Some(1), Some(5)]);
        let inner = with_table(2, 2, &[Some(3), Some(4)]);
        run_call(&mut session, &outer, &[1]);
        run_call(&mut session, &inner, &[3]);
        run_call(&mut session, &inner, &[4]);

        assert_eq!(session.stats().code_units, 2);
        let record = session.capture();
        assert_eq!(record.executable.unwrap()["app.py"].to_vec(), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_missing_line_table_is_not_zero_lines() {
        let config = TraceConfig::builder().collect_executable(true).build();
        let mut session = TraceSession::new(config);
        session.start();
        run_call(&mut session, &unit(1, "app.py", 1), &[1]);

        let executable = session.capture().executable.unwrap();
        assert!(!executable.contains_key("app.py"));
    }

    #[test]
    fn test_executable_absent_when_disabled() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.start();
        run_call(&mut session, &with_table(1, 1, &[Some(1)]), &[1]);
        assert!(session.capture().executable.is_none());
    }
}

// ============================================================================
// Arcs
// ============================================================================

mod arc_tests {
    use super::*;

    fn arc_session() -> TraceSession {
        let mut session = TraceSession::new(TraceConfig::builder().collect_arcs(true).build());
        session.start();
        session
    }

    #[test]
    fn test_entry_interior_exit() {
        let mut session = arc_session();
        run_call(&mut session, &unit(1, "main.py", 3), &[4, 5]);

        let record = session.capture();
        assert_eq!(arcs_of(&record, "main.py"), vec![(-3, 3), (3, 4), (4, 5), (5, -3)]);
    }

    #[test]
    fn test_first_line_on_call_line_adds_no_self_arc() {
        let mut session = arc_session();
        run_call(&mut session, &unit(1, "main.py", 1), &[1, 2]);
        assert_eq!(arcs_of(&session.capture(), "main.py"), vec![(-1, 1), (1, 2), (2, -1)]);
    }

    #[test]
    fn test_loop_on_one_line_keeps_self_arc() {
        let mut session = arc_session();
        run_call(&mut session, &unit(1, "main.py", 1), &[2, 2, 3]);
        assert!(arcs_of(&session.capture(), "main.py").contains(&(2, 2)));
    }

    #[test]
    fn test_nested_call_resumes_caller_line() {
        let mut session = arc_session();
        let module = unit(1, "main.py", 1);
        let func = unit(2, "main.py", 1);

        session.on_event(TraceEvent::Call, &module, 1);
        session.on_event(TraceEvent::Line, &module, 1);
        session.on_event(TraceEvent::Line, &module, 4);
        run_call(&mut session, &func, &[2]);
        session.on_event(TraceEvent::Line, &module, 5);
        session.on_event(TraceEvent::Return, &module, 5);

        let arcs = arcs_of(&session.capture(), "main.py");
        assert!(arcs.contains(&(1, 4)));
        assert!(arcs.contains(&(4, 5)));
        assert!(arcs.contains(&(1, 2)));
        assert!(arcs.contains(&(2, -1)));
    }

    #[test]
    fn test_cross_file_arcs_dropped() {
        let mut session = arc_session();
        let caller = unit(1, "main.py", 1);
        let callee = unit(2, "lib.py", 7);

        session.on_event(TraceEvent::Call, &caller, 1);
        session.on_event(TraceEvent::Line, &caller, 1);
        // A line event reported under another file while `main.py` is on top.
        session.on_event(TraceEvent::Line, &callee, 8);
        session.on_event(TraceEvent::Return, &caller, 8);

        let record = session.capture();
        let arcs = record.arcs.as_ref().unwrap();
        for (file, set) in arcs {
            for arc in set {
                for end in [arc.source(), arc.target()] {
                    if let ArcEndpoint::Line(line) = end {
                        assert!(line > 0, "{file}: {arc}");
                    }
                }
            }
        }
        assert!(!arcs_of(&record, "main.py").contains(&(1, 8)));
        assert_eq!(session.stats().dropped_arcs, 2);
    }

    #[test]
    fn test_arcs_absent_when_disabled() {
        let mut session = TraceSession::new(TraceConfig::default());
        session.start();
        run_call(&mut session, &unit(1, "main.py", 1), &[1, 2]);
        assert!(session.capture().arcs.is_none());
    }

    #[test]
    fn test_framed_export_round_trips() {
        let mut session = arc_session();
        run_call(&mut session, &unit(1, "main.py", 1), &[1, 2]);

        let mut out = b"boot noise\n".to_vec();
        session.export_framed(&mut out).unwrap();
        out.extend_from_slice(b">>> ");

        let text = String::from_utf8(out).unwrap();
        let record = crate::capture::extract_framed(&text).unwrap();
        assert_eq!(record, session.capture());
    }
}
