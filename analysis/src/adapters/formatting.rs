//! Formatters run in check mode. They never rewrite the file; the diff they
//! would apply is reported instead.
//!
//! A file needs changes when the tool returns its "would change" exit code
//! or prints at least one hunk for the file. Any other non-zero exit is a
//! tool fault.

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, stderr_suffix};
use crate::parser::Parsed;
use crate::parser::diff::{UNIFIED, blocks_to_parsed, parse_diff};

const REFORMAT: &str = "reformat";

pub struct FormatterTool {
    name: &'static str,
    category: ToolCategory,
    program: &'static str,
    args: &'static [&'static str],
    /// Exit code meaning "the file would change".
    change_code: i32,
}

impl ToolAdapter for FormatterTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> ToolCategory {
        self.category
    }

    fn program(&self) -> &'static str {
        self.program
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let args = self
            .args
            .iter()
            .map(|arg| (*arg).to_string())
            .chain([ctx.file_arg()]);
        let invocation = ctx.invoke(&ctx.request(settings, args))?;
        check_exit(&invocation, &settings.program, &[])?;

        let code = invocation.exit_code.unwrap_or(-1);
        if code != 0 && code != self.change_code {
            return Err(Failure::adapter_fault(format!(
                "{} exited with code {code}{}",
                settings.program,
                stderr_suffix(&invocation)
            )));
        }

        let blocks = parse_diff(&invocation.stdout, &UNIFIED);
        let mut parsed = blocks_to_parsed(&blocks, ctx.target(), REFORMAT);
        if code == self.change_code && parsed.issues.is_empty() {
            parsed
                .issues
                .push(IssueRecord::new(ctx.canonical, "would reformat").with_kind(REFORMAT));
        }
        Ok(parsed)
    }
}

/// Exit 1: would reformat. Exit 123: internal error.
pub fn black() -> FormatterTool {
    FormatterTool {
        name: "black",
        category: ToolCategory::Formatting,
        program: "black",
        args: &["--check", "--diff"],
        change_code: 1,
    }
}

pub fn isort() -> FormatterTool {
    FormatterTool {
        name: "isort",
        category: ToolCategory::Formatting,
        program: "isort",
        args: &["--check-only", "--diff"],
        change_code: 1,
    }
}

/// With `--exit-code`, 1 is an error and 2 means a diff exists.
pub fn autopep8() -> FormatterTool {
    FormatterTool {
        name: "autopep8",
        category: ToolCategory::Formatting,
        program: "autopep8",
        args: &["--diff", "--exit-code"],
        change_code: 2,
    }
}

pub fn docformatter() -> FormatterTool {
    FormatterTool {
        name: "docformatter",
        category: ToolCategory::Documentation,
        program: "docformatter",
        args: &["--check", "--diff"],
        change_code: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;
    use crate::invoke::Invocation;
    use pyreview_core::FailureKind;

    #[test]
    fn test_black_diff_becomes_issue() {
        let fixture = Fixture::new("import os,sys\n");
        let stdout = format!(
            "--- {path}\t2024-05-01 10:00:00.000000+00:00\n\
             +++ {path}\t2024-05-01 10:00:01.000000+00:00\n\
             @@ -1 +1 @@\n\
             -import os,sys\n\
             +import os, sys\n",
            path = fixture.canonical
        );
        let invoker = CannedInvoker::new()
            .respond("black", Invocation::new(1, stdout, "would reformat mod.py\n"));
        let parsed = run(&black(), &fixture, &invoker).unwrap();

        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].kind.as_deref(), Some(REFORMAT));
        assert_eq!(parsed.issues[0].line, Some(1));
        assert_eq!(
            parsed.issues[0].extra_str("diff"),
            Some("-import os,sys\n+import os, sys")
        );
    }

    #[test]
    fn test_change_code_without_diff_would_reformat() {
        let fixture = Fixture::new("x=1\n");
        let invoker = CannedInvoker::new().respond(
            "isort",
            Invocation::new(1, "", "ERROR: imports are incorrectly sorted"),
        );
        let parsed = run(&isort(), &fixture, &invoker).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].message, "would reformat");
    }

    #[test]
    fn test_diff_wins_over_success_exit() {
        let fixture = Fixture::new("def f():\n  '''doc'''\n");
        let stdout = format!(
            "--- before/{path}\n+++ after/{path}\n@@ -2 +2 @@\n-  '''doc'''\n+  \"\"\"Doc.\"\"\"\n",
            path = fixture.canonical
        );
        let invoker = CannedInvoker::new().respond("docformatter", Invocation::new(0, stdout, ""));
        let parsed = run(&docformatter(), &fixture, &invoker).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].line, Some(2));
    }

    #[test]
    fn test_clean_file_is_empty() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new().respond("autopep8", Invocation::new(0, "", ""));
        let parsed = run(&autopep8(), &fixture, &invoker).unwrap();
        assert!(parsed.issues.is_empty());
    }

    #[test]
    fn test_other_exit_code_is_fault() {
        let fixture = Fixture::new("def (:\n");
        let invoker = CannedInvoker::new().respond(
            "black",
            Invocation::new(123, "", "error: cannot format mod.py: Cannot parse: 1:4"),
        );
        let failure = run(&black(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
        assert!(failure.detail.contains("Cannot parse"));

        let invoker = CannedInvoker::new().respond("autopep8", Invocation::new(1, "", "boom"));
        let failure = run(&autopep8(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
    }
}
