//! Report envelope written by the command-line surface.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use pyreview_core::REPORT_CONTRACT_VERSION;

/// A report plus the metadata needed to interpret it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBundle<R> {
    /// Report contract version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// RFC 3339 timestamp.
    pub generated_at: String,
    /// Version of the program that produced the report.
    pub tool_version: String,
    pub report: R,
}

/// Wraps `report` with the current contract version and timestamp.
pub fn build_report_bundle<R>(tool_version: &str, report: R) -> ReportBundle<R> {
    ReportBundle {
        schema_version: Some(REPORT_CONTRACT_VERSION.to_string()),
        generated_at: Utc::now().to_rfc3339(),
        tool_version: tool_version.to_string(),
        report,
    }
}
