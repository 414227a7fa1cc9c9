//! Test runners and coverage.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, stderr_suffix};
use crate::invoke::InvokeRequest;
use crate::parser::Parsed;
use crate::parser::line::{PYTEST, PYTEST_VERBOSE};
use crate::parser::normalize::normalize_output;
use crate::parser::table::{COVERAGE, parse_table};
use crate::scratch::ScratchSpace;

/// pytest: internal error, usage error.
const PYTEST_FAULT_CODES: &[i32] = &[3, 4];
/// pytest: no tests collected.
const NO_TESTS_COLLECTED: i32 = 5;

pub struct Pytest;

impl ToolAdapter for Pytest {
    fn name(&self) -> &'static str {
        "pytest"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Testing
    }

    fn program(&self) -> &'static str {
        "pytest"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let args = ["--tb=short", "--maxfail=5", "-rA"]
            .into_iter()
            .map(str::to_string)
            .chain([ctx.file_arg()]);
        let invocation = ctx.invoke(&ctx.request(settings, args))?;
        check_exit(&invocation, &settings.program, PYTEST_FAULT_CODES)?;

        let parsed = PYTEST.parse(&invocation.stdout, ctx.target());
        if invocation.exit_code == Some(NO_TESTS_COLLECTED) {
            return Ok(Parsed {
                issues: Vec::new(),
                ..parsed
            });
        }
        Ok(parsed)
    }
}

/// Coverage of the file under review when its tests run.
pub struct Coverage;

impl Coverage {
    fn step(
        ctx: &AdapterContext<'_>,
        settings: &ToolSettings,
        scratch: &ScratchSpace,
        args: &[&str],
    ) -> InvokeRequest {
        InvokeRequest::new(settings.program.clone(), settings.timeout)
            .args(args.iter().copied())
            .cwd(ctx.root)
            .env("COVERAGE_FILE", scratch.file(".coverage"))
    }
}

impl ToolAdapter for Coverage {
    fn name(&self) -> &'static str {
        "coverage"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Testing
    }

    fn program(&self) -> &'static str {
        "coverage"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let scratch = ScratchSpace::create("coverage")?;

        ctx.invoke(&Self::step(ctx, settings, &scratch, &["erase"]))?;

        let file = ctx.file_arg();
        let run = Self::step(ctx, settings, &scratch, &["run", "-m", "pytest"])
            .arg(file)
            .args(settings.extra_args.iter().cloned());
        let ran = ctx.invoke(&run)?;
        check_exit(&ran, &settings.program, &[])?;

        let report = ctx.invoke(&Self::step(ctx, settings, &scratch, &["report", "-m"]))?;
        check_exit(&report, &settings.program, &[])?;

        let Some(table) = parse_table(&report.stdout, &COVERAGE) else {
            let detail = report.stdout.trim();
            return Err(if report.succeeded() && !detail.is_empty() {
                Failure::invalid_format(format!("coverage report has no table: {detail}"))
            } else {
                Failure::adapter_fault(format!(
                    "coverage report exited with code {}{}",
                    report.exit_code.unwrap_or(-1),
                    stderr_suffix(&report)
                ))
            });
        };

        let target = ctx.target();
        let mut parsed = Parsed {
            dropped_lines: table.skipped_rows,
            ..Parsed::default()
        };
        for row in &table.rows {
            if !target.owns(&row.key) {
                parsed.foreign_records += 1;
                continue;
            }
            let coverage = row.cells.get("coverage").and_then(Value::as_str).unwrap_or("");
            let mut issue =
                IssueRecord::new(ctx.canonical, format!("{coverage} of statements covered"))
                    .with_kind("coverage");
            issue.extra = row.cells.clone();
            parsed.issues.push(issue);
        }

        if parsed.issues.is_empty() {
            return Err(Failure::path_not_found(
                ctx.canonical,
                table.rows.iter().map(|row| row.key.as_str()),
            ));
        }
        if let Some(total) = table.aggregate {
            parsed.summary.extend(total.cells);
        }
        Ok(parsed)
    }
}

/// Property-based tests: falsifying examples become issues.
pub struct Hypothesis;

impl ToolAdapter for Hypothesis {
    fn name(&self) -> &'static str {
        "hypothesis"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Testing
    }

    fn program(&self) -> &'static str {
        "pytest"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let invocation = ctx.invoke(&ctx.request(settings, ["-v".to_string(), ctx.file_arg()]))?;
        check_exit(&invocation, &settings.program, PYTEST_FAULT_CODES)?;

        let mut parsed = PYTEST_VERBOSE.parse(&invocation.stdout, ctx.target());
        parsed
            .issues
            .retain(|issue| matches!(issue.kind.as_deref(), Some("FAILED" | "ERROR")));
        parsed
            .issues
            .extend(falsifying_examples(&invocation.stdout, ctx.canonical));
        Ok(parsed)
    }
}

fn falsifying_examples(stdout: &str, canonical: &str) -> Vec<IssueRecord> {
    static FALSIFYING_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)Falsifying example:\s*(.+?)(?:\n\n|\z)")
            .expect("static regex must compile")
    });
    FALSIFYING_RE
        .captures_iter(&normalize_output(stdout))
        .filter_map(|caps| caps.get(1))
        .map(|example| example.as_str().trim())
        .filter(|example| !example.is_empty())
        .map(|example| IssueRecord::new(canonical, example).with_kind("falsifying_example"))
        .collect()
}
