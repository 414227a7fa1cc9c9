//! Project report merging with configurable conflict resolution.
//!
//! Used to fold a partial (resumed or cancelled) run into an earlier report.
//! Files present in only one input are carried over unchanged.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use pyreview_core::*;
//!
//! let mut first = BTreeMap::new();
//! first.insert("a.py".to_string(), ProjectEntry::Report(FileReport::default()));
//! let base = ProjectReport::new("/p", false, first);
//!
//! let mut second = BTreeMap::new();
//! second.insert("b.py".to_string(), ProjectEntry::Report(FileReport::default()));
//! let overlay = ProjectReport::new("/p", true, second);
//!
//! let merged = merge_project_reports(&base, &overlay, MergeStrategy::PreferOverlay);
//! assert_eq!(merged.paths(), vec!["a.py", "b.py"]);
//! assert!(merged.complete);
//! ```

use crate::{ProjectEntry, ProjectReport};

/// Report merge behavior for files present in both inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Keep the base entry.
    PreferBase,
    /// Keep the overlay entry.
    PreferOverlay,
    /// Keep whichever entry is a report rather than an error leaf; when
    /// both are the same kind, the overlay wins.
    PreferSuccessful,
}

/// Merges two project reports into one.
///
/// The merged report keeps the base root. It is complete when either input
/// was complete, since the union then covers every discovered file.
pub fn merge_project_reports(
    base: &ProjectReport,
    overlay: &ProjectReport,
    strategy: MergeStrategy,
) -> ProjectReport {
    let mut files = base.files.clone();

    for (path, incoming) in &overlay.files {
        match files.get(path) {
            None => {
                files.insert(path.clone(), incoming.clone());
            }
            Some(existing) => {
                if let Some(chosen) = resolve_conflict(existing, incoming, strategy) {
                    files.insert(path.clone(), chosen.clone());
                }
            }
        }
    }

    ProjectReport::new(base.root.clone(), base.complete || overlay.complete, files)
}

/// Returns the overlay entry when it should replace the existing one.
fn resolve_conflict<'a>(
    existing: &ProjectEntry,
    incoming: &'a ProjectEntry,
    strategy: MergeStrategy,
) -> Option<&'a ProjectEntry> {
    match strategy {
        MergeStrategy::PreferBase => None,
        MergeStrategy::PreferOverlay => Some(incoming),
        MergeStrategy::PreferSuccessful => {
            if incoming.is_error() && !existing.is_error() {
                None
            } else {
                Some(incoming)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::{FileReport, ToolResult};

    fn report_with(entries: &[(&str, ProjectEntry)], complete: bool) -> ProjectReport {
        let files: BTreeMap<String, ProjectEntry> = entries
            .iter()
            .map(|(path, entry)| (path.to_string(), entry.clone()))
            .collect();
        ProjectReport::new("/root", complete, files)
    }

    fn ok(tool: &str) -> ProjectEntry {
        ProjectEntry::Report(FileReport::from_results(vec![ToolResult::succeeded(
            tool,
            Vec::new(),
        )]))
    }

    fn err(message: &str) -> ProjectEntry {
        ProjectEntry::Error {
            error: message.to_string(),
        }
    }

    #[test]
    fn test_prefer_base_keeps_base_entry() {
        let base = report_with(&[("a.py", ok("base"))], false);
        let overlay = report_with(&[("a.py", ok("overlay"))], false);
        let merged = merge_project_reports(&base, &overlay, MergeStrategy::PreferBase);
        assert_eq!(merged.get("a.py"), Some(&ok("base")));
        assert!(!merged.complete);
    }

    #[test]
    fn test_prefer_overlay_replaces_entry() {
        let base = report_with(&[("a.py", ok("base"))], true);
        let overlay = report_with(&[("a.py", err("crash"))], false);
        let merged = merge_project_reports(&base, &overlay, MergeStrategy::PreferOverlay);
        assert_eq!(merged.get("a.py"), Some(&err("crash")));
        assert!(merged.complete);
    }

    #[test]
    fn test_prefer_successful_never_replaces_report_with_error() {
        let base = report_with(&[("a.py", ok("base")), ("b.py", err("old"))], false);
        let overlay = report_with(&[("a.py", err("new")), ("b.py", ok("retry"))], false);
        let merged = merge_project_reports(&base, &overlay, MergeStrategy::PreferSuccessful);
        assert_eq!(merged.get("a.py"), Some(&ok("base")));
        assert_eq!(merged.get("b.py"), Some(&ok("retry")));
    }
}
