//! Core report types for normalized Python analysis output.
//!
//! This crate defines the shapes every tool adapter folds its output into:
//!
//! - [`IssueRecord`] — one finding, pinned to the canonical file path.
//! - [`ToolResult`] — one adapter run: issues, an explicit empty success,
//!   or a typed [`Failure`].
//! - [`FileReport`] — one result per registered tool, in registration order.
//! - [`ProjectReport`] — relative path to file report (or error leaf).
//!
//! Validation ([`validate_file_report`], [`validate_project_report`]) checks
//! the consumer-facing contract. Merging ([`merge_project_reports`]) folds a
//! resumed run into an earlier report using a [`MergeStrategy`].
//!
//! # Example
//!
//! ```
//! use pyreview_core::*;
//!
//! let canonical = "/proj/pkg/mod.py";
//! let report = FileReport::from_results(vec![
//!     ToolResult::succeeded(
//!         "flake8",
//!         vec![
//!             IssueRecord::new(canonical, "line too long (88 > 79 characters)")
//!                 .with_position(Some(12), Some(80))
//!                 .with_code("E501"),
//!         ],
//!     ),
//!     ToolResult::succeeded("black", Vec::new()),
//!     ToolResult::failed("mypy", Failure::tool_unavailable("mypy: not found")),
//! ]);
//!
//! assert_eq!(report.issue_count(), 1);
//! assert_eq!(report.get("black").unwrap().outcome, ToolOutcome::SucceededEmpty);
//! assert!(validate_file_report(&report, canonical, &["flake8", "black", "mypy"]).is_empty());
//! ```

mod merge;
mod project;
mod types;
mod validate;

pub use merge::{MergeStrategy, merge_project_reports};
pub use project::{ProjectEntry, ProjectReport, REPORT_CONTRACT_VERSION};
pub use types::*;
pub use validate::{ReportViolation, validate_file_report, validate_project_report};
