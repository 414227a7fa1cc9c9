//! API documentation generation with pdoc.

use walkdir::WalkDir;

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, stderr_suffix};
use crate::parser::Parsed;
use crate::parser::traceback::extract_traceback;
use crate::scratch::ScratchSpace;

/// Builds API docs into a scratch directory. A build failure is reported as
/// one issue named after the exception that stopped it.
pub struct Pdoc;

impl ToolAdapter for Pdoc {
    fn name(&self) -> &'static str {
        "pdoc"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Documentation
    }

    fn program(&self) -> &'static str {
        "pdoc"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let scratch = ScratchSpace::create("pdoc")?;
        let request = ctx.request(
            settings,
            [
                ctx.file_arg(),
                "-o".to_string(),
                scratch.path().to_string_lossy().into_owned(),
            ],
        );
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;

        if invocation.succeeded() {
            let pages = WalkDir::new(scratch.path())
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "html"))
                .count();
            return Ok(Parsed::default().with_summary("pages", pages as u64));
        }

        let trace = extract_traceback(&invocation.stderr);
        if trace.is_unknown() {
            return Err(Failure::adapter_fault(format!(
                "{} exited with code {}{}",
                settings.program,
                invocation.exit_code.unwrap_or(-1),
                stderr_suffix(&invocation)
            )));
        }
        let issue = IssueRecord::new(ctx.canonical, &trace.message).with_kind(trace.kind.as_str());
        Ok(Parsed::from_issues(vec![issue]))
    }
}
