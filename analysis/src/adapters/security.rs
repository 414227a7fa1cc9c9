//! Security linting.

use serde_json::Value;

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit};
use crate::parser::Parsed;
use crate::parser::json::{JsonShape, RecordKeys, extract, lookup, parse_document};

const BANDIT_SHAPE: JsonShape = JsonShape::FlatList {
    container: Some("results"),
    path: Some("filename"),
    keys: RecordKeys {
        line: Some("line_number"),
        column: Some("col_offset"),
        zero_based_column: true,
        code: Some("test_id"),
        kind: Some("issue_severity"),
        message: &["issue_text"],
        fallback_message: "security issue",
        renames: &[],
    },
};

pub struct Bandit;

impl ToolAdapter for Bandit {
    fn name(&self) -> &'static str {
        "bandit"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Security
    }

    fn program(&self) -> &'static str {
        "bandit"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let request = ctx.request(settings, ["-f".to_string(), "json".into(), ctx.file_arg()]);
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[2])?;

        let document = parse_document(&invocation.stdout)?;
        let mut parsed = extract(&document, &BANDIT_SHAPE, ctx.target())?;

        // Files bandit could not scan, e.g. syntax errors.
        if let Some(errors) = document.get("errors").and_then(Value::as_array) {
            for error in errors {
                let owned = error
                    .get("filename")
                    .and_then(Value::as_str)
                    .is_some_and(|file| ctx.target().owns(file));
                if !owned {
                    continue;
                }
                let reason = error.get("reason").and_then(Value::as_str).unwrap_or("scan error");
                parsed.issues.push(IssueRecord::new(ctx.canonical, reason).with_kind("error"));
            }
        }

        if let Some(totals) = lookup(&document, "metrics._totals").and_then(Value::as_object) {
            for key in ["loc", "nosec", "SEVERITY.HIGH", "SEVERITY.MEDIUM", "SEVERITY.LOW"] {
                if let Some(value) = totals.get(key) {
                    parsed.summary.insert(key.to_lowercase(), value.clone());
                }
            }
        }
        Ok(parsed)
    }
}
