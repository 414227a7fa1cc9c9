//! Normalized result types shared by every tool adapter.
//!
//! This module defines the uniform shape that heterogeneous tool output is
//! folded into. Each tool keeps its native vocabulary (codes, kinds,
//! severities pass through untouched); only the *shape* is normalized.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// One normalized finding produced by one tool.
///
/// `file` always holds the canonical path of the file under review, never
/// the raw string the tool printed. Tool-specific auxiliary data that has no
/// slot in the generic schema (symbol names, suggested corrections,
/// confidence levels, metrics) is preserved in `extra`.
///
/// # Examples
///
/// ```
/// use pyreview_core::IssueRecord;
///
/// let issue = IssueRecord::new("src/app.py", "  expected 2 blank lines, found 1 ")
///     .with_position(Some(3), Some(1))
///     .with_code("E302");
///
/// assert_eq!(issue.line, Some(3));
/// assert_eq!(issue.message, "expected 2 blank lines, found 1");
/// assert_eq!(issue.code.as_deref(), Some("E302"));
/// assert!(issue.extra.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    /// Canonical path of the analyzed file.
    pub file: String,
    /// 1-based line, absent for file-granular findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-based column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Short tool-specific classifier (e.g. `E302`, `B101`, `DEP001`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Tool-native classifier (e.g. `error`, `note`, `function`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Human-readable text, trimmed.
    pub message: String,
    /// Tool-specific auxiliary fields, in emission order.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl IssueRecord {
    /// Creates a record with only a file and a message.
    pub fn new(file: impl Into<String>, message: impl AsRef<str>) -> Self {
        Self {
            file: file.into(),
            line: None,
            column: None,
            code: None,
            kind: None,
            message: message.as_ref().trim().to_string(),
            extra: Map::new(),
        }
    }

    /// Sets line and column. Zero is not a valid 1-based position and is
    /// stored as absent.
    pub fn with_position(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line.filter(|value| *value > 0);
        self.column = column.filter(|value| *value > 0);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Adds one auxiliary field. Later values for the same key replace
    /// earlier ones but keep the original position.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Returns an auxiliary field as a string slice, if it is one.
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }
}

/// Error taxonomy for tool results.
///
/// Every kind except [`FailureKind::PartialLine`] is terminal for exactly one
/// [`ToolResult`]. `PartialLine` is recovered inside a parser and only ever
/// surfaces as a dropped-line count.
///
/// # Examples
///
/// ```
/// use pyreview_core::FailureKind;
///
/// assert_eq!(FailureKind::PathNotFound.to_string(), "path_not_found");
/// assert!(FailureKind::Timeout.is_terminal());
/// assert!(!FailureKind::PartialLine.is_terminal());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Output could not be parsed as the expected syntax at all.
    InvalidFormat,
    /// Output was valid but nothing in it matched the target file.
    PathNotFound,
    /// The external tool could not be invoked.
    ToolUnavailable,
    /// The invocation exceeded its allotted time.
    Timeout,
    /// Any other unexpected failure inside one adapter.
    AdapterFault,
    /// One malformed record inside an otherwise valid stream.
    PartialLine,
}

impl FailureKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::PartialLine)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat => write!(f, "invalid_format"),
            Self::PathNotFound => write!(f, "path_not_found"),
            Self::ToolUnavailable => write!(f, "tool_unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::AdapterFault => write!(f, "adapter_fault"),
            Self::PartialLine => write!(f, "partial_line"),
        }
    }
}

/// A typed failure: taxonomy kind plus human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_format(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidFormat, detail)
    }

    /// Builds a `PathNotFound` failure that names the searched path and
    /// every candidate key it was compared against.
    ///
    /// # Examples
    ///
    /// ```
    /// use pyreview_core::{Failure, FailureKind};
    ///
    /// let failure = Failure::path_not_found("/p/a.py", ["/p/b.py", "/p/c.py"]);
    /// assert_eq!(failure.kind, FailureKind::PathNotFound);
    /// assert!(failure.detail.contains("/p/a.py"));
    /// assert!(failure.detail.contains("/p/c.py"));
    /// ```
    pub fn path_not_found<I, S>(searched: &str, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys: Vec<String> = candidates
            .into_iter()
            .map(|key| format!("'{}'", key.as_ref()))
            .collect();
        Self::new(
            FailureKind::PathNotFound,
            format!(
                "matching path not found: '{searched}' not in [{}]",
                keys.join(", ")
            ),
        )
    }

    pub fn tool_unavailable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ToolUnavailable, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn adapter_fault(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::AdapterFault, detail)
    }
}

/// Terminal state of one adapter run.
///
/// Serialized with an explicit `status` discriminator so that an empty
/// success is never confused with a missing or failed result.
///
/// # Examples
///
/// ```
/// use pyreview_core::{IssueRecord, ToolOutcome};
///
/// assert_eq!(ToolOutcome::from_issues(Vec::new()), ToolOutcome::SucceededEmpty);
///
/// let outcome = ToolOutcome::from_issues(vec![IssueRecord::new("a.py", "boom")]);
/// assert_eq!(outcome.issues().len(), 1);
/// assert_eq!(outcome.status_label(), "succeeded-with-issues");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ToolOutcome {
    /// Tool ran and reported findings, in emission order.
    #[serde(rename = "succeeded-with-issues")]
    Succeeded { issues: Vec<IssueRecord> },
    /// Tool ran and found nothing.
    #[serde(rename = "succeeded-empty")]
    SucceededEmpty,
    /// Tool could not produce a usable result.
    #[serde(rename = "failed")]
    Failed { kind: FailureKind, detail: String },
}

impl ToolOutcome {
    /// Wraps parsed issues, collapsing an empty list to `SucceededEmpty`.
    pub fn from_issues(issues: Vec<IssueRecord>) -> Self {
        if issues.is_empty() {
            Self::SucceededEmpty
        } else {
            Self::Succeeded { issues }
        }
    }

    pub fn failed(failure: Failure) -> Self {
        Self::Failed {
            kind: failure.kind,
            detail: failure.detail,
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn issues(&self) -> &[IssueRecord] {
        match self {
            Self::Succeeded { issues } => issues,
            _ => &[],
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded-with-issues",
            Self::SucceededEmpty => "succeeded-empty",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of running one adapter once, for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool identifier. Serialized as the key of the enclosing
    /// [`FileReport`], so it is not repeated inside the value.
    #[serde(skip_serializing, default)]
    pub tool: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    /// Whole-file summary data (ratings, totals) that is not a location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Map<String, Value>>,
    /// Lines or records dropped as malformed while parsing.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped_lines: usize,
}

fn is_zero(value: &usize) -> bool {
    *value == 0
}

impl ToolResult {
    pub fn new(tool: impl Into<String>, outcome: ToolOutcome) -> Self {
        Self {
            tool: tool.into(),
            outcome,
            summary: None,
            dropped_lines: 0,
        }
    }

    pub fn succeeded(tool: impl Into<String>, issues: Vec<IssueRecord>) -> Self {
        Self::new(tool, ToolOutcome::from_issues(issues))
    }

    pub fn failed(tool: impl Into<String>, failure: Failure) -> Self {
        Self::new(tool, ToolOutcome::failed(failure))
    }

    pub fn with_summary(mut self, summary: Option<Map<String, Value>>) -> Self {
        self.summary = summary.filter(|map| !map.is_empty());
        self
    }

    pub fn with_dropped_lines(mut self, dropped: usize) -> Self {
        self.dropped_lines = dropped;
        self
    }

    pub fn issues(&self) -> &[IssueRecord] {
        self.outcome.issues()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Per-file report: one [`ToolResult`] per registered tool, in adapter
/// registration order.
///
/// Serializes as a map from tool name to result; key order is preserved in
/// both directions.
///
/// # Examples
///
/// ```
/// use pyreview_core::{Failure, FileReport, ToolResult};
///
/// let report: FileReport = vec![
///     ToolResult::succeeded("flake8", Vec::new()),
///     ToolResult::failed("mypy", Failure::tool_unavailable("mypy: not found")),
/// ]
/// .into_iter()
/// .collect();
///
/// assert_eq!(report.tool_names(), vec!["flake8", "mypy"]);
/// assert_eq!(report.failure_count(), 1);
///
/// let json = serde_json::to_string(&report).unwrap();
/// assert!(json.starts_with(r#"{"flake8":{"status":"succeeded-empty"}"#));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileReport {
    results: Vec<ToolResult>,
}

impl FileReport {
    pub fn from_results(results: Vec<ToolResult>) -> Self {
        Self { results }
    }

    pub fn get(&self, tool: &str) -> Option<&ToolResult> {
        self.results.iter().find(|result| result.tool == tool)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ToolResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.results.iter().map(|result| result.tool.as_str()).collect()
    }

    pub fn issue_count(&self) -> usize {
        self.results.iter().map(|result| result.issues().len()).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|result| !result.is_success()).count()
    }

    pub fn dropped_lines(&self) -> usize {
        self.results.iter().map(|result| result.dropped_lines).sum()
    }
}

impl FromIterator<ToolResult> for FileReport {
    fn from_iter<T: IntoIterator<Item = ToolResult>>(iter: T) -> Self {
        Self::from_results(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FileReport {
    type Item = &'a ToolResult;
    type IntoIter = std::slice::Iter<'a, ToolResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl Serialize for FileReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.results.len()))?;
        for result in &self.results {
            map.serialize_entry(&result.tool, result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FileReport {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FileReportVisitor;

        impl<'de> Visitor<'de> for FileReportVisitor {
            type Value = FileReport;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of tool name to tool result")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FileReport, A::Error> {
                let mut results = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((tool, mut result)) = access.next_entry::<String, ToolResult>()? {
                    result.tool = tool;
                    results.push(result);
                }
                Ok(FileReport { results })
            }
        }

        deserializer.deserialize_map(FileReportVisitor)
    }
}
