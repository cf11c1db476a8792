//! Statement resolver tests

#![allow(clippy::unwrap_used)]

use super::*;

fn statements(source: &str) -> Vec<u32> {
    analyze(source).unwrap().statements.to_vec()
}

// ============================================================================
// Statement counting
// ============================================================================

mod statement_tests {
    use super::*;

    #[test]
    fn test_simple_module() {
        assert_eq!(statements("import os\n\nx = 1\n"), vec![1, 3]);
    }

    #[test]
    fn test_blank_and_comment_lines_ignored() {
        assert_eq!(statements("# header\n\n   \nx = 1  # trailing\n"), vec![4]);
    }

    #[test]
    fn test_multiline_statement_counts_first_line() {
        assert_eq!(statements("x = foo(\n    1,\n    2)\ny = 2\n"), vec![1, 4]);
    }

    #[test]
    fn test_docstrings_excluded() {
        let source = r#""""Module doc."""
import os


def f(a):
    """Doc."""
    return a


class C:
    """Doc."""

    x = 1
"#;
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![2, 5, 7, 10, 13]);
        assert_eq!(analysis.definitions.to_vec(), vec![5, 10]);
    }

    #[test]
    fn test_multiline_docstring() {
        let source = "def f():\n    \"\"\"First.\n\n    More.\n    \"\"\"\n    return 1\n";
        assert_eq!(statements(source), vec![1, 6]);
    }

    #[test]
    fn test_bare_else_and_finally_not_counted() {
        let source = "\
try:
    a()
except E:
    b()
else:
    c()
finally:
    d()
if x:
    y()
else: z()
";
        assert_eq!(statements(source), vec![1, 2, 3, 4, 6, 8, 9, 10, 11]);
    }

    #[test]
    fn test_inline_body_counts_header_only() {
        assert_eq!(statements("if x: y = 1\nwhile z: pass\n"), vec![1, 2]);
    }

    #[test]
    fn test_global_and_nonlocal_not_counted() {
        let source = "\
def f():
    global g
    g = 1
    def h():
        nonlocal g
        return g
";
        assert_eq!(statements(source), vec![1, 3, 4, 6]);
    }

    #[test]
    fn test_decorators_counted() {
        let source = "@decorator\n@other(arg=1)\ndef f():\n    pass\n";
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![1, 2, 3, 4]);
        assert_eq!(analysis.definitions.to_vec(), vec![3]);
    }

    #[test]
    fn test_async_definitions() {
        let analysis = analyze("async def f():\n    await g()\n").unwrap();
        assert_eq!(analysis.definitions.to_vec(), vec![1]);
        assert_eq!(analysis.statements.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_fstring_expression_is_statement() {
        assert_eq!(statements("f\"{x()}\"\n"), vec![1]);
    }

    #[test]
    fn test_ellipsis_body_counted() {
        assert_eq!(statements("def f():\n    ...\n"), vec![1, 2]);
    }

    #[test]
    fn test_bare_expressions_outside_docstring_position_counted() {
        let source = "def f():\n    ...\n\nx = 1\n\"stray\"\n42\n";
        assert_eq!(statements(source), vec![1, 2, 4, 5, 6]);
    }

    #[test]
    fn test_string_mid_body_is_not_a_docstring() {
        let source = "\
def f():
    \"\"\"Doc.\"\"\"
    a = 1
    \"note\"
    return a
";
        assert_eq!(statements(source), vec![1, 3, 4, 5]);
    }

    #[test]
    fn test_docstring_after_decorated_def_and_in_nested_class() {
        let source = "\
@dec
def f():
    'doc'
    class Inner:
        'inner doc' 'continued'
        y = 2
";
        assert_eq!(statements(source), vec![1, 2, 4, 6]);
    }

    #[test]
    fn test_module_docstring_only_at_top() {
        assert_eq!(statements("import os\n'not a docstring'\n"), vec![1, 2]);
        assert_eq!(statements("# comment\n\n'doc'\nimport os\n"), vec![4]);
    }

    #[test]
    fn test_docstring_in_control_block_counted() {
        assert_eq!(statements("if x:\n    'text'\n"), vec![1, 2]);
    }

    #[test]
    fn test_match_statement() {
        let source = "\
match cmd:
    case 1:
        go()
    case _:
        stop()
";
        assert_eq!(statements(source), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_empty_source() {
        assert!(statements("").is_empty());
        assert!(statements("\n\n# only a comment\n").is_empty());
    }
}

// ============================================================================
// Exclusion pragma
// ============================================================================

mod pragma_tests {
    use super::*;

    #[test]
    fn test_single_line_excluded() {
        let analysis = analyze("a = 1\nb = 2  # pragma: no cover\nc = 3\n").unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![1, 3]);
        assert_eq!(analysis.excluded.to_vec(), vec![2]);
    }

    #[test]
    fn test_block_header_excludes_block() {
        let source = "\
def f():  # pragma: no cover
    a = 1
    if a:
        return 2

b = 3
";
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![6]);
        assert_eq!(analysis.excluded.to_vec(), vec![1, 2, 3, 4]);
        // Still a definition for decoder compensation
        assert_eq!(analysis.definitions.to_vec(), vec![1]);
    }

    #[test]
    fn test_decorator_excludes_definition() {
        let source = "@dec  # PRAGMA: NO COVER\ndef f():\n    return 1\nx = 1\n";
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![4]);
        assert_eq!(analysis.excluded.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_if_block_keeps_else_branch() {
        let source = "if debug:  # pragma: no cover\n    log()\nelse:\n    run()\n";
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![4]);
        assert_eq!(analysis.excluded.to_vec(), vec![1, 2]);
    }

    #[test]
    fn test_pragma_on_continuation_line() {
        let source = "x = call(\n    1,  # pragma: no cover\n)\ny = 1\n";
        let analysis = analyze(source).unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![4]);
        assert_eq!(analysis.excluded.to_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_pragma_spellings() {
        for comment in ["# pragma no cover", "#pragma:no cover", "#  pragma: no  cover"] {
            let source = format!("a = 1 {comment}\nb = 2\n");
            assert_eq!(statements(&source), vec![2], "{comment}");
        }
    }

    #[test]
    fn test_pragma_text_inside_string_ignored() {
        assert_eq!(statements("s = '# pragma: no cover'\n"), vec![1]);
    }

    #[test]
    fn test_custom_pattern() {
        let analysis = analyze_with("a = 1  # nocov\nb = 2\n", r"#\s*nocov").unwrap();
        assert_eq!(analysis.statements.to_vec(), vec![2]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            analyze_with("a = 1\n", "("),
            Err(GrammarError::Pattern(_))
        ));
    }
}

// ============================================================================
// Failures
// ============================================================================

mod error_tests {
    use super::*;

    #[test]
    fn test_unterminated_triple_string() {
        let err = analyze("x = '''never closed\n").unwrap_err();
        assert_eq!(err, GrammarError::UnterminatedString { line: 1 });
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_statement_lines_propagates_error() {
        assert!(statement_lines("f(\n").is_err());
    }
}
