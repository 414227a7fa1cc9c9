//! Output formatting for file and project reports.

use pyreview_core::{FileReport, IssueRecord, ProjectEntry, ProjectReport, ToolOutcome};

use crate::report::ReportBundle;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OutputFormat {
    Json,
    Yaml,
    Markdown,
    Table,
}

/// Formats one file's report. `file` labels the rendered text formats.
pub fn format_file_report(
    file: &str,
    report: &FileReport,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Markdown => {
            let mut out = format!("# Review: {file}\n\n");
            file_to_markdown(report, &mut out);
            Ok(out)
        }
        OutputFormat::Table => {
            let mut out = format!("{file}\n");
            file_to_table(report, &mut out);
            Ok(out)
        }
    }
}

/// Formats a project report.
pub fn format_project_report(
    report: &ProjectReport,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(report).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Markdown => Ok(project_to_markdown(report)),
        OutputFormat::Table => Ok(project_to_table(report)),
    }
}

/// Formats a bundled project report. The structured formats keep the
/// envelope; the text formats render the report alone.
pub fn format_project_bundle(
    bundle: &ReportBundle<ProjectReport>,
    format: OutputFormat,
) -> Result<String, String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(bundle)
            .map_err(|e| format!("JSON serialization failed: {e}")),
        OutputFormat::Yaml => {
            serde_yaml::to_string(bundle).map_err(|e| format!("YAML serialization failed: {e}"))
        }
        OutputFormat::Markdown | OutputFormat::Table => {
            format_project_report(&bundle.report, format)
        }
    }
}

fn project_to_markdown(report: &ProjectReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("# Review: {}\n\n", report.root));
    out.push_str(&format!("- **Files:** {}\n", report.file_count()));
    out.push_str(&format!("- **Issues:** {}\n", report.issue_count()));
    out.push_str(&format!("- **Tool failures:** {}\n", report.failure_count()));
    out.push_str(&format!("- **File errors:** {}\n", report.error_count()));
    out.push_str(&format!(
        "- **Complete:** {}\n\n",
        if report.complete { "yes" } else { "no" }
    ));

    for (path, entry) in &report.files {
        out.push_str(&format!("## {path}\n\n"));
        match entry {
            ProjectEntry::Report(file) => file_to_markdown(file, &mut out),
            ProjectEntry::Error { error } => {
                out.push_str(&format!("**Error:** {}\n\n", escape_cell(error)));
            }
        }
    }
    out
}

fn file_to_markdown(report: &FileReport, out: &mut String) {
    out.push_str("| Tool | Status | Issues | Detail |\n");
    out.push_str("|------|--------|--------|--------|\n");
    for result in report {
        let detail = match &result.outcome {
            ToolOutcome::Failed { kind, detail } => format!("{kind}: {}", first_line(detail)),
            _ => String::new(),
        };
        out.push_str(&format!(
            "| `{}` | {} | {} | {} |\n",
            result.tool,
            result.outcome.status_label(),
            result.issues().len(),
            escape_cell(&detail)
        ));
    }
    out.push('\n');

    if report.issue_count() == 0 {
        return;
    }
    out.push_str("| Tool | Line | Code | Message |\n");
    out.push_str("|------|------|------|---------|\n");
    for result in report {
        for issue in result.issues() {
            out.push_str(&format!(
                "| `{}` | {} | {} | {} |\n",
                result.tool,
                position(issue),
                issue.code.as_deref().unwrap_or(""),
                escape_cell(first_line(&issue.message))
            ));
        }
    }
    out.push('\n');
}

fn project_to_table(report: &ProjectReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Root: {}  Files: {}  Issues: {}  Failures: {}  Errors: {}",
        report.root,
        report.file_count(),
        report.issue_count(),
        report.failure_count(),
        report.error_count()
    ));
    if !report.complete {
        out.push_str("  (incomplete)");
    }
    out.push('\n');

    for (path, entry) in &report.files {
        out.push_str(&format!("\n{path}\n"));
        match entry {
            ProjectEntry::Report(file) => file_to_table(file, &mut out),
            ProjectEntry::Error { error } => out.push_str(&format!("  ERROR  {error}\n")),
        }
    }
    out
}

fn file_to_table(report: &FileReport, out: &mut String) {
    let max_name = report.iter().map(|result| result.tool.len()).max().unwrap_or(4);
    for result in report {
        let status = match &result.outcome {
            ToolOutcome::Succeeded { issues } => format!("{} issue(s)", issues.len()),
            ToolOutcome::SucceededEmpty => "ok".to_string(),
            ToolOutcome::Failed { kind, detail } => format!("FAIL [{kind}] {}", first_line(detail)),
        };
        out.push_str(&format!(
            "  {:<width$}  {status}\n",
            result.tool,
            width = max_name
        ));
        for issue in result.issues() {
            let code = issue
                .code
                .as_deref()
                .map(|code| format!("[{code}] "))
                .unwrap_or_default();
            out.push_str(&format!(
                "  {:<width$}    {}  {code}{}\n",
                "",
                position(issue),
                first_line(&issue.message),
                width = max_name
            ));
        }
    }
}

fn position(issue: &IssueRecord) -> String {
    match (issue.line, issue.column) {
        (Some(line), Some(column)) => format!("{line}:{column}"),
        (Some(line), None) => line.to_string(),
        _ => "-".to_string(),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::report::build_report_bundle;
    use pyreview_core::{Failure, ToolResult};

    fn sample_file_report() -> FileReport {
        FileReport::from_results(vec![
            ToolResult::succeeded(
                "flake8",
                vec![
                    IssueRecord::new("/p/a.py", "line too long | wrapped")
                        .with_position(Some(3), Some(80))
                        .with_code("E501"),
                ],
            ),
            ToolResult::succeeded("black", Vec::new()),
            ToolResult::failed("mypy", Failure::tool_unavailable("mypy: command not found")),
        ])
    }

    fn sample_project() -> ProjectReport {
        let mut files = BTreeMap::new();
        files.insert("a.py".to_string(), ProjectEntry::Report(sample_file_report()));
        files.insert(
            "b.py".to_string(),
            ProjectEntry::Error {
                error: "not a file: /p/b.py".to_string(),
            },
        );
        ProjectReport::new("/p", false, files)
    }

    #[test]
    fn test_format_file_report_json_keeps_tool_order() {
        let json = format_file_report("a.py", &sample_file_report(), OutputFormat::Json).unwrap();
        let flake8 = json.find("\"flake8\"").unwrap();
        let black = json.find("\"black\"").unwrap();
        let mypy = json.find("\"mypy\"").unwrap();
        assert!(flake8 < black && black < mypy);
        assert!(json.contains("\"status\": \"succeeded-with-issues\""));
        assert!(json.contains("\"kind\": \"tool_unavailable\""));
    }

    #[test]
    fn test_format_project_report_yaml() {
        let yaml = format_project_report(&sample_project(), OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("complete: false"));
        assert!(yaml.contains("not a file: /p/b.py"));
    }

    #[test]
    fn test_format_project_report_markdown() {
        let md = format_project_report(&sample_project(), OutputFormat::Markdown).unwrap();
        assert!(md.contains("# Review: /p"));
        assert!(md.contains("- **Complete:** no"));
        assert!(md.contains("## a.py"));
        assert!(md.contains("| `mypy` | failed | 0 | tool_unavailable: mypy: command not found |"));
        assert!(md.contains("| `flake8` | 3:80 | E501 | line too long \\| wrapped |"));
        assert!(md.contains("**Error:** not a file: /p/b.py"));
    }

    #[test]
    fn test_format_project_report_table() {
        let table = format_project_report(&sample_project(), OutputFormat::Table).unwrap();
        assert!(table.starts_with(
            "Root: /p  Files: 2  Issues: 1  Failures: 1  Errors: 1  (incomplete)"
        ));
        assert!(table.contains("  flake8  1 issue(s)"));
        assert!(table.contains("  black   ok"));
        assert!(table.contains("3:80  [E501] line too long"));
        assert!(table.contains("  ERROR  not a file"));
    }

    #[test]
    fn test_format_project_bundle_wraps_structured_formats_only() {
        let bundle = build_report_bundle("0.1.0", sample_project());
        let json = format_project_bundle(&bundle, OutputFormat::Json).unwrap();
        assert!(json.contains("\"tool_version\": \"0.1.0\""));
        assert!(json.contains("\"report\""));

        let table = format_project_bundle(&bundle, OutputFormat::Table).unwrap();
        assert!(!table.contains("0.1.0"));
    }
}
