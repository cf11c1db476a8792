//! Status messages and progress reporting on stderr
//!
//! Command results (reports, JSON, CSV) go to stdout; everything printed here
//! goes to stderr so it never mixes into piped output.

use console::{style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use mpycov::Warning;

/// Progress reporter for batch commands
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar over `total` items
    ///
    /// Skipped in quiet mode and when stderr is not a terminal.
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Advance by one item, showing `item` as the message
    pub fn step(&self, item: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(item.to_string());
            pb.inc(1);
        }
    }

    /// Remove the progress bar
    pub fn finish(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "Warning:".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print every warning of a batch
    pub fn warnings(&self, warnings: &[Warning]) {
        for warning in warnings {
            self.warning(&warning.to_string());
        }
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        self.line(message);
    }

    fn line(&self, text: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.suspend(|| {
                let _ = self.term.write_line(text);
            });
        } else {
            let _ = self.term.write_line(text);
        }
    }
}

/// Format a percentage the way the text report shows it
#[must_use]
pub fn format_percent(percent: f64) -> String {
    format!("{percent:.0}%")
}
