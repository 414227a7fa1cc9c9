//! Extraction of the most specific exception from an interpreter trace.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Placeholder used when no exception line is found.
pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TracebackSummary {
    /// Last dotted segment of the exception name.
    pub kind: String,
    pub message: String,
    pub raw: String,
}

impl TracebackSummary {
    pub fn is_unknown(&self) -> bool {
        self.kind == UNKNOWN
    }
}

/// Scans `text` bottom-up for a `qualified.Name: message` line.
///
/// # Examples
///
/// ```
/// use pyreview_analysis::parser::traceback::extract_traceback;
///
/// let trace = "\
/// Traceback (most recent call last):
///   File \"cli.py\", line 3, in <module>
/// deptry.exceptions.DependencySpecificationNotFoundError: No file called 'pyproject.toml' found
/// ";
/// let summary = extract_traceback(trace);
/// assert_eq!(summary.kind, "DependencySpecificationNotFoundError");
/// assert_eq!(summary.message, "No file called 'pyproject.toml' found");
/// ```
pub fn extract_traceback(text: &str) -> TracebackSummary {
    static EXCEPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^((?:[A-Za-z_]\w*\.)*[A-Z]\w*):(?:\s+(.*))?$")
            .expect("static regex must compile")
    });

    for line in text.lines().rev() {
        let trimmed = line.trim();
        if let Some(caps) = EXCEPTION_RE.captures(trimmed) {
            let qualified = caps.get(1).map_or("", |m| m.as_str());
            let kind = qualified.rsplit('.').next().unwrap_or(qualified);
            let message = caps.get(2).map_or("", |m| m.as_str().trim());
            return TracebackSummary {
                kind: kind.to_string(),
                message: message.to_string(),
                raw: text.to_string(),
            };
        }
    }

    TracebackSummary {
        kind: UNKNOWN.to_string(),
        message: UNKNOWN.to_string(),
        raw: text.to_string(),
    }
}
