//! Format parsers, one per output shape family.
//!
//! Each parser turns raw tool output into [`Parsed`]: issue records already
//! attributed to the canonical file, an optional whole-file summary, and
//! counters for lines that were dropped or belonged to other files.
//!
//! - [`line`] — `path:line:col: CODE message` style text.
//! - [`json`] — JSON documents in one of several top-level layouts.
//! - [`diff`] — unified-diff-like streams split into per-file hunks.
//! - [`table`] — whitespace-separated tables with header and trailer rows.
//! - [`traceback`] — the most specific exception in an interpreter trace.

pub mod diff;
pub mod json;
pub mod line;
pub mod normalize;
pub mod table;
pub mod traceback;

use pyreview_core::IssueRecord;
use serde_json::{Map, Value};

use crate::paths::PathReconciler;

/// The file a parser attributes records to.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub canonical: &'a str,
    pub reconciler: &'a PathReconciler,
}

impl<'a> Target<'a> {
    pub fn new(canonical: &'a str, reconciler: &'a PathReconciler) -> Self {
        Self {
            canonical,
            reconciler,
        }
    }

    /// Returns `true` when a tool-reported path denotes the target file.
    pub fn owns(&self, reported: &str) -> bool {
        self.reconciler.reconcile(reported, self.canonical)
    }
}

/// Output of one parse run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
    /// Records for the target file, in emission order.
    pub issues: Vec<IssueRecord>,
    /// Whole-file data such as ratings and totals.
    pub summary: Map<String, Value>,
    /// Records dropped as malformed.
    pub dropped_lines: usize,
    /// Well-formed records that belonged to another file.
    pub foreign_records: usize,
}

impl Parsed {
    pub fn from_issues(issues: Vec<IssueRecord>) -> Self {
        Self {
            issues,
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.summary.insert(key.into(), value.into());
        self
    }
}

/// Parses a textual number into a JSON number, preferring integers.
pub(crate) fn number_value(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(Value::from(int));
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(Value::from)
}
