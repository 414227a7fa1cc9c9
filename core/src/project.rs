//! Project-level report: relative path to per-file report.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::FileReport;

/// Version of the serialized report contract.
pub const REPORT_CONTRACT_VERSION: &str = "1.0.0";

/// One leaf of a [`ProjectReport`].
///
/// A file whose analysis failed wholesale is recorded as an error leaf
/// instead of being dropped from the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectEntry {
    Error { error: String },
    Report(FileReport),
}

impl ProjectEntry {
    pub fn report(&self) -> Option<&FileReport> {
        match self {
            Self::Report(report) => Some(report),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error { error } => Some(error),
            Self::Report(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<FileReport> for ProjectEntry {
    fn from(report: FileReport) -> Self {
        Self::Report(report)
    }
}

/// Reports for every discovered Python file under one root.
///
/// Keys are root-relative paths using `/` separators, sorted
/// lexicographically. `complete` is `false` when the run was cancelled
/// before every discovered file was analyzed.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use pyreview_core::*;
///
/// let mut files = BTreeMap::new();
/// files.insert(
///     "pkg/b.py".to_string(),
///     ProjectEntry::Report(FileReport::from_results(vec![
///         ToolResult::succeeded("flake8", vec![IssueRecord::new("/p/pkg/b.py", "x")]),
///     ])),
/// );
/// files.insert(
///     "a.py".to_string(),
///     ProjectEntry::Error { error: "worker panicked".into() },
/// );
///
/// let report = ProjectReport::new("/p", true, files);
/// assert_eq!(report.paths(), vec!["a.py", "pkg/b.py"]);
/// assert_eq!(report.issue_count(), 1);
/// assert_eq!(report.error_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectReport {
    pub root: String,
    pub complete: bool,
    pub files: BTreeMap<String, ProjectEntry>,
}

impl ProjectReport {
    pub fn new(
        root: impl Into<String>,
        complete: bool,
        files: BTreeMap<String, ProjectEntry>,
    ) -> Self {
        Self {
            root: root.into(),
            complete,
            files,
        }
    }

    pub fn get(&self, path: &str) -> Option<&ProjectEntry> {
        self.files.get(path)
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn reports(&self) -> impl Iterator<Item = (&str, &FileReport)> {
        self.files
            .iter()
            .filter_map(|(path, entry)| entry.report().map(|report| (path.as_str(), report)))
    }

    pub fn issue_count(&self) -> usize {
        self.reports().map(|(_, report)| report.issue_count()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.reports().map(|(_, report)| report.failure_count()).sum()
    }

    pub fn error_count(&self) -> usize {
        self.files.values().filter(|entry| entry.is_error()).count()
    }
}
