//! Report contract validation.
//!
//! Checks the structural guarantees a consumer relies on: exactly one result
//! per registered tool, issue paths pinned to the canonical file, and no
//! success variant that contradicts its issue list.
//!
//! # Examples
//!
//! ```
//! use pyreview_core::*;
//!
//! let report = FileReport::from_results(vec![
//!     ToolResult::succeeded("flake8", vec![IssueRecord::new("/p/a.py", "x")]),
//! ]);
//! assert!(validate_file_report(&report, "/p/a.py", &["flake8"]).is_empty());
//!
//! // Registered tool with no result
//! let errors = validate_file_report(&report, "/p/a.py", &["flake8", "mypy"]);
//! assert_eq!(errors, vec![ReportViolation::MissingTool("mypy".into())]);
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{FailureKind, FileReport, ProjectReport, ToolOutcome, ToolResult};

/// Report contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReportViolation {
    /// A registered tool has no result in the report.
    #[error("missing result for tool: {0}")]
    MissingTool(String),
    /// Two results share a tool name.
    #[error("duplicate result for tool: {0}")]
    DuplicateTool(String),
    /// A result exists for a tool that is not registered.
    #[error("unexpected result for tool: {0}")]
    UnexpectedTool(String),
    /// An issue names a file other than the canonical path.
    #[error("issue from {tool} points at '{found}' instead of '{expected}'")]
    ForeignIssuePath {
        tool: String,
        expected: String,
        found: String,
    },
    /// A `succeeded-with-issues` result carries no issues.
    #[error("tool {0} reports success with issues but lists none")]
    EmptyIssueList(String),
    /// A result failed with a kind that is only recoverable inside a parser.
    #[error("tool {tool} failed with non-terminal kind {kind}")]
    NonTerminalFailure { tool: String, kind: FailureKind },
    /// A project report key is not a clean relative path.
    #[error("invalid project path key: {0}")]
    InvalidProjectKey(String),
}

/// Validates one file report against the registered tool list.
pub fn validate_file_report(
    report: &FileReport,
    canonical: &str,
    expected_tools: &[&str],
) -> Vec<ReportViolation> {
    let mut errors = check_tool_coverage(report, expected_tools);

    for result in report {
        errors.extend(check_failure_kind(result));
        if let ToolOutcome::Succeeded { issues } = &result.outcome {
            if issues.is_empty() {
                errors.push(ReportViolation::EmptyIssueList(result.tool.clone()));
            }
            for issue in issues {
                if issue.file != canonical {
                    errors.push(ReportViolation::ForeignIssuePath {
                        tool: result.tool.clone(),
                        expected: canonical.to_string(),
                        found: issue.file.clone(),
                    });
                }
            }
        }
    }

    errors
}

/// Validates every report leaf of a project report.
///
/// Canonical issue paths are not checked here because the project report
/// only knows root-relative keys; per-file validation covers them.
pub fn validate_project_report(
    report: &ProjectReport,
    expected_tools: &[&str],
) -> Vec<ReportViolation> {
    let mut errors = Vec::new();

    for (path, entry) in &report.files {
        if !is_clean_relative_key(path) {
            errors.push(ReportViolation::InvalidProjectKey(path.clone()));
        }
        if let Some(file_report) = entry.report() {
            errors.extend(check_tool_coverage(file_report, expected_tools));
            for result in file_report {
                errors.extend(check_failure_kind(result));
                if matches!(&result.outcome, ToolOutcome::Succeeded { issues } if issues.is_empty())
                {
                    errors.push(ReportViolation::EmptyIssueList(result.tool.clone()));
                }
            }
        }
    }

    errors
}

fn check_tool_coverage(report: &FileReport, expected_tools: &[&str]) -> Vec<ReportViolation> {
    let mut errors = Vec::new();
    let expected: HashSet<&str> = expected_tools.iter().copied().collect();
    let mut seen = HashSet::new();

    for result in report {
        let tool = result.tool.as_str();
        if !seen.insert(tool) {
            errors.push(ReportViolation::DuplicateTool(tool.to_string()));
        }
        if !expected.contains(tool) {
            errors.push(ReportViolation::UnexpectedTool(tool.to_string()));
        }
    }

    for tool in expected_tools {
        if !seen.contains(tool) {
            errors.push(ReportViolation::MissingTool((*tool).to_string()));
        }
    }

    errors
}

fn check_failure_kind(result: &ToolResult) -> Option<ReportViolation> {
    let kind = result.outcome.failure_kind()?;
    (!kind.is_terminal()).then(|| ReportViolation::NonTerminalFailure {
        tool: result.tool.clone(),
        kind,
    })
}

fn is_clean_relative_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key.split('/').all(|part| !part.is_empty() && part != "." && part != "..")
}
