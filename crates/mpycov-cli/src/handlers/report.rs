//! Report command handler

use super::{load_captures, merged_summary};
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::output::format_percent;
use crate::ReportArgs;
use mpycov::report::format_ranges;
use mpycov::{
    build_report, device_lines, merge, CaptureRecord, CoverageDocument, HandoffEngine, Resolver,
};

/// Execute the report command
pub fn execute_report(config: &CliConfig, args: &ReportArgs) -> CliResult<()> {
    let mut reporter = super::reporter(config);
    let captures = load_captures(config, &reporter)?;
    reporter.info(&format!(
        "Merging {} data file(s) from {}",
        captures.len(),
        config.data_dir.display()
    ));
    let records: Vec<CaptureRecord> = captures.into_iter().map(|c| c.record).collect();
    let merged = merge(&records);
    reporter.info(&merged_summary(&merged));

    let method = config.method(args.method.map(Into::into));
    let resolver = Resolver::new(method)
        .with_mapping(config.path_mapping(&args.path_map, args.source_root.as_deref())?)
        .with_compiler(config.compiler(args.mpy_cross.as_deref()));
    let filter = config.filter(&args.include, &args.exclude);
    let files: Vec<&str> = merged.files().filter(|f| filter.accepts(f)).collect();

    reporter.start_progress(files.len() as u64, "Resolving statements");
    let resolution = resolver.resolve_with_progress(
        files.iter().copied(),
        &device_lines(&records),
        |file| reporter.step(file),
    );
    reporter.finish();
    let resolution = resolution?;
    reporter.warnings(&resolution.warnings);

    let mut engine = HandoffEngine::new().with_arcs(args.branch);
    let outcome = build_report(&resolution, &merged, &mut engine);
    reporter.warnings(&outcome.warnings);

    if outcome.document.files.is_empty() {
        reporter.info("No files to report on.");
    } else {
        print!(
            "{}",
            render_text_report(&outcome.document, args.show_missing, args.branch)
        );
    }

    if let Some(ref path) = args.output {
        outcome.document.save(path)?;
        reporter.success(&format!("JSON report written to {}", path.display()));
    }
    Ok(())
}

/// Render the per-file summary table with a total row
#[must_use]
pub fn render_text_report(doc: &CoverageDocument, show_missing: bool, branch: bool) -> String {
    let width = doc
        .files
        .iter()
        .map(|f| f.file.len())
        .chain(["Name".len(), "TOTAL".len()])
        .max()
        .unwrap_or(0);

    let row = |name: &str,
               stmts: String,
               miss: String,
               cover: String,
               arcs: Option<String>,
               missing: Option<String>| {
        let mut line = format!("{name:<width$}  {stmts:>5}  {miss:>5}  {cover:>5}");
        if branch {
            line.push_str(&format!("  {:>5}", arcs.unwrap_or_default()));
        }
        if show_missing {
            line.push_str(&format!("   {}", missing.unwrap_or_default()));
        }
        line.trim_end().to_string()
    };

    let header = row(
        "Name",
        "Stmts".into(),
        "Miss".into(),
        "Cover".into(),
        Some("Arcs".into()),
        Some("Missing".into()),
    );
    let rule = "-".repeat(header.len());

    let mut out = format!("{header}\n{rule}\n");
    for file in &doc.files {
        let line = row(
            &file.file,
            file.statements.len().to_string(),
            file.missing.len().to_string(),
            format_percent(file.percent),
            file.arcs.as_ref().map(|a| a.len().to_string()),
            Some(format_ranges(&file.missing)),
        );
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&rule);
    out.push('\n');

    let totals = &doc.totals;
    let total_arcs = branch.then(|| {
        doc.files
            .iter()
            .filter_map(|f| f.arcs.as_ref())
            .map(Vec::len)
            .sum::<usize>()
            .to_string()
    });
    out.push_str(&row(
        "TOTAL",
        totals.statements.to_string(),
        totals.missing.to_string(),
        format_percent(totals.percent),
        total_arcs,
        None,
    ));
    out.push('\n');
    out
}
