//! Include/exclude filtering of file paths
//!
//! Patterns are plain substrings, not globs or regexes: `foo` matches both
//! `bar_foo_baz.py` and `foobar.py`.

/// Substrings identifying the tracer's own modules, which are never traced
pub const TRACER_MODULES: &[&str] = &["mpy_coverage"];

/// True if `path` belongs to the tracer itself
#[must_use]
pub fn is_tracer_module(path: &str) -> bool {
    TRACER_MODULES.iter().any(|m| path.contains(m))
}

/// Decides which paths are kept, by include and exclude patterns only
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl PathFilter {
    /// Create a filter from include and exclude patterns
    #[must_use]
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Whether `path` passes the patterns
    #[must_use]
    pub fn accepts(&self, path: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|p| path.contains(p.as_str())) {
            return false;
        }
        !self.exclude.iter().any(|p| path.contains(p.as_str()))
    }

    /// Include patterns
    #[must_use]
    pub fn include(&self) -> &[String] {
        &self.include
    }

    /// Exclude patterns
    #[must_use]
    pub fn exclude(&self) -> &[String] {
        &self.exclude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
        PathFilter::new(
            include.iter().map(|s| s.to_string()).collect(),
            exclude.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let f = PathFilter::default();
        assert!(f.accepts("main.py"));
        assert!(f.accepts("/lib/drivers/led.py"));
        assert!(f.accepts("/home/dev/mpycov-demo/app.py"));
    }

    #[test]
    fn test_tracer_module_detection() {
        assert!(is_tracer_module("/lib/mpy_coverage.py"));
        assert!(!is_tracer_module("/home/dev/mpycov-demo/app.py"));
        assert!(!is_tracer_module("main.py"));
    }

    #[test]
    fn test_include_is_substring_match() {
        let f = filter(&["foo"], &[]);
        assert!(f.accepts("bar_foo_baz.py"));
        assert!(f.accepts("foobar.py"));
        assert!(!f.accepts("bar.py"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let f = filter(&["app/"], &["test_"]);
        assert!(f.accepts("app/sensor.py"));
        assert!(!f.accepts("app/test_sensor.py"));
    }

    #[test]
    fn test_any_include_pattern_suffices() {
        let f = filter(&["app/", "lib/"], &[]);
        assert!(f.accepts("lib/net.py"));
        assert!(f.accepts("app/main.py"));
        assert!(!f.accepts("boot.py"));
    }
}
