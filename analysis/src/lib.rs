//! Run Python analysis tools and normalize their output.
//!
//! Every tool speaks its own dialect: colon-separated lines, JSON documents
//! in several layouts, unified diffs, fixed-width tables, interpreter
//! tracebacks. This crate parses each of them into the uniform
//! [`IssueRecord`](pyreview_core::IssueRecord) model, attributes records to
//! the file under review by reconciling the paths tools print, and assembles
//! per-file and project-wide reports in which every tool has exactly one
//! entry, whether it succeeded or failed.
//!
//! # Main entry points
//!
//! - [`Analyzer::analyze_file`] — one [`FileReport`](pyreview_core::FileReport).
//! - [`Analyzer::analyze_project`] — one [`ProjectReport`](pyreview_core::ProjectReport)
//!   for every `.py` file under a root.
//! - [`parser`] — the format parsers, usable on pre-captured output without
//!   running any tool.
//!
//! # Example
//!
//! ```
//! use pyreview_analysis::parser::Target;
//! use pyreview_analysis::parser::line::FLAKE8;
//! use pyreview_analysis::paths::{PathOptions, PathReconciler};
//!
//! let reconciler = PathReconciler::new("/work/proj", PathOptions::default());
//! let target = Target::new("/work/proj/pkg/mod.py", &reconciler);
//!
//! let output = "\
//! pkg/mod.py:3:1: E302 expected 2 blank lines, found 1
//! other.py:1:1: F401 'os' imported but unused
//! ";
//! let parsed = FLAKE8.parse(output, target);
//! assert_eq!(parsed.issues.len(), 1);
//! assert_eq!(parsed.issues[0].file, "/work/proj/pkg/mod.py");
//! assert_eq!(parsed.issues[0].code.as_deref(), Some("E302"));
//! assert_eq!(parsed.foreign_records, 1);
//! ```

pub mod adapters;
pub mod aggregate;
pub mod config;
pub mod error;
pub mod invoke;
pub mod output;
pub mod parser;
pub mod paths;
pub mod report;
pub mod scratch;
pub mod unit;
pub mod walk;

pub use adapters::{AdapterRegistry, ToolAdapter, ToolCategory};
pub use aggregate::{Analyzer, CancellationToken};
pub use config::ReviewConfig;
pub use error::AnalysisError;
pub use invoke::{ProcessInvoker, SystemInvoker};
pub use output::OutputFormat;
pub use report::{ReportBundle, build_report_bundle};
