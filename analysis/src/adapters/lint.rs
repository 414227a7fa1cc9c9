//! Linters with line-oriented output.

use std::sync::LazyLock;

use pyreview_core::Failure;

use super::{
    AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, check_silent_failure,
};
use crate::parser::Parsed;
use crate::parser::line::{CODESPELL, DARGLINT, FLAKE8, LineDialect, MYPY, PEP8_NAMING, PYLINT};

/// A tool run as `program [leading args] <file>` whose stdout is parsed with
/// one line dialect.
pub struct LineTool {
    name: &'static str,
    category: ToolCategory,
    program: &'static str,
    leading_args: &'static [&'static str],
    dialect: &'static LazyLock<LineDialect>,
    /// Exit codes meaning the tool itself failed.
    fault_codes: &'static [i32],
}

impl ToolAdapter for LineTool {
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
            .leading_args
            .iter()
            .map(|arg| (*arg).to_string())
            .chain([ctx.file_arg()]);
        let invocation = ctx.invoke(&ctx.request(settings, args))?;
        check_exit(&invocation, &settings.program, self.fault_codes)?;

        let parsed = self.dialect.parse(&invocation.stdout, ctx.target());
        check_silent_failure(&invocation, &settings.program, &parsed)?;
        Ok(parsed)
    }
}

/// Exit status 32 is pylint's usage error; lower bits flag message classes.
pub fn pylint() -> LineTool {
    LineTool {
        name: "pylint",
        category: ToolCategory::Quality,
        program: "pylint",
        leading_args: &[],
        dialect: &PYLINT,
        fault_codes: &[32],
    }
}

pub fn flake8() -> LineTool {
    LineTool {
        name: "flake8",
        category: ToolCategory::Quality,
        program: "flake8",
        leading_args: &[],
        dialect: &FLAKE8,
        fault_codes: &[],
    }
}

/// mypy exits 2 on crashes and invalid invocations.
pub fn mypy() -> LineTool {
    LineTool {
        name: "mypy",
        category: ToolCategory::Quality,
        program: "mypy",
        leading_args: &[],
        dialect: &MYPY,
        fault_codes: &[2],
    }
}

pub fn codespell() -> LineTool {
    LineTool {
        name: "codespell",
        category: ToolCategory::Quality,
        program: "codespell",
        leading_args: &[],
        dialect: &CODESPELL,
        fault_codes: &[64],
    }
}

pub fn pep8_naming() -> LineTool {
    LineTool {
        name: "pep8_naming",
        category: ToolCategory::Quality,
        program: "flake8",
        leading_args: &["--select=N"],
        dialect: &PEP8_NAMING,
        fault_codes: &[],
    }
}

pub fn darglint() -> LineTool {
    LineTool {
        name: "darglint",
        category: ToolCategory::Documentation,
        program: "darglint",
        leading_args: &[],
        dialect: &DARGLINT,
        fault_codes: &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;
    use crate::invoke::Invocation;
    use pyreview_core::FailureKind;

    #[test]
    fn test_pylint_issues_and_rating() {
        let fixture = Fixture::new("import os\n");
        let stdout = format!(
            "************* Module pkg.mod\n\
             {path}:1:0: C0114: Missing module docstring (missing-module-docstring)\n\
             {path}:1:0: W0611: Unused import os (unused-import)\n\
             \n\
             ------------------------------------------------------------------\n\
             Your code has been rated at 0.00/10 (previous run: 0.00/10, +0.00)\n",
            path = fixture.canonical
        );
        let invoker = CannedInvoker::new().respond("pylint", Invocation::new(20, stdout, ""));
        let parsed = run(&pylint(), &fixture, &invoker).unwrap();

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[1].code.as_deref(), Some("W0611"));
        assert_eq!(parsed.issues[1].column, Some(1));
        assert_eq!(parsed.issues[1].extra_str("symbol"), Some("unused-import"));
        assert_eq!(parsed.summary["rating"], serde_json::json!(0.0));
    }

    #[test]
    fn test_pylint_usage_error_is_fault() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new()
            .respond("pylint", Invocation::new(32, "", "pylint: error: no such option"));
        let failure = run(&pylint(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
        assert!(failure.detail.contains("no such option"));
    }

    #[test]
    fn test_flake8_drops_other_files() {
        let fixture = Fixture::new("x=1\n");
        let stdout = format!(
            "{path}:1:2: E225 missing whitespace around operator\n\
             /elsewhere/other.py:4:1: F401 'os' imported but unused\n",
            path = fixture.canonical
        );
        let invoker = CannedInvoker::new().respond("flake8", Invocation::new(1, stdout, ""));
        let parsed = run(&flake8(), &fixture, &invoker).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.foreign_records, 1);
        assert_eq!(parsed.issues[0].file, fixture.canonical);
    }

    #[test]
    fn test_missing_binary_is_tool_unavailable() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new().missing("mypy");
        let failure = run(&mypy(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::ToolUnavailable);
    }

    #[test]
    fn test_nonzero_exit_with_only_stderr_is_fault() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new().respond(
            "flake8",
            Invocation::new(1, "", "Traceback (most recent call last):\nImportError: plugin"),
        );
        let failure = run(&flake8(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
    }

    #[test]
    fn test_pep8_naming_selects_n_codes() {
        let fixture = Fixture::new("def Foo():\n    pass\n");
        let stdout = format!(
            "{}:1:5: N802 function name 'Foo' should be lowercase\n",
            fixture.canonical
        );
        let invoker = CannedInvoker::new().respond("flake8", Invocation::new(1, stdout, ""));
        let parsed = run(&pep8_naming(), &fixture, &invoker).unwrap();
        assert_eq!(parsed.issues[0].kind.as_deref(), Some("N-series naming"));
        assert_eq!(invoker.requests()[0].args[0], "--select=N");
    }
}
