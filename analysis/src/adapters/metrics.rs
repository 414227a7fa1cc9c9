//! Complexity and maintainability metrics, plus refactoring suggestions.

use pyreview_core::Failure;

use super::{
    AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, check_silent_failure,
};
use crate::parser::Parsed;
use crate::parser::diff::{REFACTOR, blocks_to_parsed, parse_diff};
use crate::parser::json::{JsonShape, RecordKeys, parse_json};

/// `radon cc -s -j`: path mapped to a list of blocks.
const RADON_CC_SHAPE: JsonShape = JsonShape::PathKeyed {
    container: None,
    records: None,
    keys: RecordKeys {
        line: Some("lineno"),
        column: Some("col_offset"),
        zero_based_column: true,
        kind: Some("type"),
        message: &["name"],
        fallback_message: "code block",
        ..RecordKeys::EMPTY
    },
};

/// `radon mi -s -j`: path mapped to a metrics object.
const RADON_MI_SHAPE: JsonShape = JsonShape::PathKeyed {
    container: None,
    records: None,
    keys: RecordKeys {
        fallback_message: "maintainability index",
        renames: &[("mi", "maintainability_index")],
        ..RecordKeys::EMPTY
    },
};

const NO_SUGGESTIONS: &str = "No refactor suggestions found.";

pub struct RadonComplexity;

impl ToolAdapter for RadonComplexity {
    fn name(&self) -> &'static str {
        "radon-cc"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Clarity
    }

    fn program(&self) -> &'static str {
        "radon"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let request = ctx.request(
            settings,
            ["cc".to_string(), "-s".into(), "-j".into(), ctx.file_arg()],
        );
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;
        parse_json(&invocation.stdout, &RADON_CC_SHAPE, ctx.target())
    }
}

/// Runs over the whole project and picks out the file under review.
pub struct RadonMaintainability;

impl ToolAdapter for RadonMaintainability {
    fn name(&self) -> &'static str {
        "radon-mi"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Clarity
    }

    fn program(&self) -> &'static str {
        "radon"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let request = ctx.request(
            settings,
            ["mi".to_string(), "-s".into(), "-j".into(), ctx.root_arg()],
        );
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;
        parse_json(&invocation.stdout, &RADON_MI_SHAPE, ctx.target())
    }
}

pub struct Refactor;

impl ToolAdapter for Refactor {
    fn name(&self) -> &'static str {
        "refactor"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Clarity
    }

    fn program(&self) -> &'static str {
        "refactor"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let request = ctx.request(settings, ["--diff".to_string(), ctx.file_arg()]);
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;

        let blocks = parse_diff(&invocation.stdout, &REFACTOR);
        let parsed = blocks_to_parsed(&blocks, ctx.target(), "refactor");
        check_silent_failure(&invocation, &settings.program, &parsed)?;

        if blocks.iter().all(|block| block.placeholder) {
            return Ok(parsed.with_summary("note", NO_SUGGESTIONS));
        }
        Ok(parsed)
    }
}
