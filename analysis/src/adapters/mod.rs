//! Tool result adapters.
//!
//! An adapter pairs one external tool's invocation with the parser for its
//! output shape and smooths over the tool's quirks: optional fields, summary
//! lines, exit codes that mean "found something" rather than "broke".
//!
//! Adapters are registered in an [`AdapterRegistry`] whose order fixes the
//! key order of every [`FileReport`](pyreview_core::FileReport).

mod dependencies;
mod documentation;
mod formatting;
mod lint;
mod metrics;
mod profiling;
mod security;
mod testing;

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use pyreview_core::{Failure, ToolResult};

use crate::config::ReviewConfig;
use crate::invoke::{Invocation, InvokeRequest, ProcessInvoker};
use crate::parser::normalize::tail;
use crate::parser::{Parsed, Target};
use crate::paths::PathReconciler;

/// Lines of stderr kept in failure details.
const STDERR_TAIL_LINES: usize = 20;

/// Broad area a tool reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Quality,
    Clarity,
    Testing,
    Security,
    Dependencies,
    Performance,
    Formatting,
    Documentation,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quality => write!(f, "quality"),
            Self::Clarity => write!(f, "clarity"),
            Self::Testing => write!(f, "testing"),
            Self::Security => write!(f, "security"),
            Self::Dependencies => write!(f, "dependencies"),
            Self::Performance => write!(f, "performance"),
            Self::Formatting => write!(f, "formatting"),
            Self::Documentation => write!(f, "documentation"),
        }
    }
}

/// Per-tool invocation settings resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSettings {
    /// Executable to run.
    pub program: String,
    /// Appended after the built-in arguments.
    pub extra_args: Vec<String>,
    pub timeout: Duration,
}

impl ToolSettings {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            timeout,
        }
    }
}

/// Everything one adapter run needs to know about the file under review.
#[derive(Clone, Copy)]
pub struct AdapterContext<'a> {
    pub file: &'a Path,
    /// Canonical path every record is attributed to.
    pub canonical: &'a str,
    /// Project root; working directory for tools.
    pub root: &'a Path,
    pub reconciler: &'a PathReconciler,
    pub invoker: &'a dyn ProcessInvoker,
    /// Extra module search path entries for executable units.
    pub search_paths: &'a [std::path::PathBuf],
}

impl<'a> AdapterContext<'a> {
    pub fn target(&self) -> Target<'a> {
        Target::new(self.canonical, self.reconciler)
    }

    /// Canonical path as a command-line argument.
    pub fn file_arg(&self) -> String {
        self.canonical.to_string()
    }

    pub fn root_arg(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    /// `settings.program` with `args`, then the configured extra arguments,
    /// run from the project root.
    pub fn request<I, S>(&self, settings: &ToolSettings, args: I) -> InvokeRequest
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        InvokeRequest::new(settings.program.clone(), settings.timeout)
            .args(args)
            .args(settings.extra_args.iter().cloned())
            .cwd(self.root)
    }

    /// Runs a request, mapping collaborator faults into failures.
    pub fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, Failure> {
        debug!(command = %request.command_line(), file = self.canonical, "Invoking tool");
        self.invoker.invoke(request).map_err(Failure::from)
    }
}

impl fmt::Debug for AdapterContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterContext")
            .field("file", &self.file)
            .field("canonical", &self.canonical)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// One external tool plus the parser for its output.
pub trait ToolAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> ToolCategory;

    /// Default executable.
    fn program(&self) -> &'static str;

    /// Whether the program is the configured Python interpreter rather than
    /// a tool-specific executable.
    fn runs_interpreter(&self) -> bool {
        false
    }

    /// Runs the tool against `ctx.file` and parses its output.
    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure>;
}

/// An adapter with its resolved settings.
pub struct RegisteredTool {
    adapter: Box<dyn ToolAdapter>,
    settings: ToolSettings,
}

impl RegisteredTool {
    pub fn new(adapter: Box<dyn ToolAdapter>, settings: ToolSettings) -> Self {
        Self { adapter, settings }
    }

    pub fn name(&self) -> &'static str {
        self.adapter.name()
    }

    pub fn category(&self) -> ToolCategory {
        self.adapter.category()
    }

    pub fn settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn adapter(&self) -> &dyn ToolAdapter {
        self.adapter.as_ref()
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.name())
            .field("settings", &self.settings)
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is registered twice")]
    DuplicateTool(String),
    #[error("unknown tool '{0}'")]
    UnknownTool(String),
}

/// Ordered set of adapters. Registration order is report order.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    tools: Vec<RegisteredTool>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        adapter: Box<dyn ToolAdapter>,
        settings: ToolSettings,
    ) -> Result<(), RegistryError> {
        if self.tools.iter().any(|tool| tool.name() == adapter.name()) {
            return Err(RegistryError::DuplicateTool(adapter.name().to_string()));
        }
        self.tools.push(RegisteredTool::new(adapter, settings));
        Ok(())
    }

    /// Every built-in adapter with default settings.
    pub fn builtin(timeout: Duration) -> Self {
        Self::from_config(&ReviewConfig {
            timeout_secs: timeout.as_secs().max(1),
            ..ReviewConfig::default()
        })
    }

    /// Built-in adapters with per-tool overrides applied. Disabled tools are
    /// left out.
    pub fn from_config(config: &ReviewConfig) -> Self {
        let mut registry = Self::new();
        for adapter in builtin_adapters() {
            let tool_override = config.tools.get(adapter.name());
            if tool_override.is_some_and(|o| !o.enabled) {
                debug!(tool = adapter.name(), "Tool disabled by configuration");
                continue;
            }

            let default_program = if adapter.runs_interpreter() {
                config.python.clone()
            } else {
                adapter.program().to_string()
            };
            let mut settings = ToolSettings::new(default_program, config.timeout());
            if let Some(tool_override) = tool_override {
                if let Some(program) = &tool_override.program {
                    settings.program = program.clone();
                }
                settings.extra_args = tool_override.args.clone();
                if let Some(secs) = tool_override.timeout_secs {
                    settings.timeout = Duration::from_secs(secs);
                }
            }
            // Built-in names are unique.
            registry.tools.push(RegisteredTool::new(adapter, settings));
        }
        registry
    }

    /// Keeps only `names`, in registration order.
    pub fn select<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self, RegistryError> {
        for name in names {
            if !self.tools.iter().any(|tool| tool.name() == name.as_ref()) {
                return Err(RegistryError::UnknownTool(name.as_ref().to_string()));
            }
        }
        self.tools
            .retain(|tool| names.iter().any(|name| name.as_ref() == tool.name()));
        Ok(self)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(RegisteredTool::name).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RegisteredTool> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<'a> IntoIterator for &'a AdapterRegistry {
    type Item = &'a RegisteredTool;
    type IntoIter = std::slice::Iter<'a, RegisteredTool>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.iter()
    }
}

/// Built-in adapters in registration order.
pub fn builtin_adapters() -> Vec<Box<dyn ToolAdapter>> {
    vec![
        Box::new(lint::pylint()),
        Box::new(lint::flake8()),
        Box::new(lint::mypy()),
        Box::new(lint::codespell()),
        Box::new(lint::pep8_naming()),
        Box::new(metrics::RadonComplexity),
        Box::new(metrics::RadonMaintainability),
        Box::new(metrics::Refactor),
        Box::new(testing::Pytest),
        Box::new(testing::Coverage),
        Box::new(testing::Hypothesis),
        Box::new(security::Bandit),
        Box::new(dependencies::Pipreqs),
        Box::new(dependencies::PipAudit),
        Box::new(dependencies::Deptry),
        Box::new(profiling::CProfile),
        Box::new(profiling::line_profiler()),
        Box::new(profiling::memory_profiler()),
        Box::new(profiling::Scalene),
        Box::new(formatting::black()),
        Box::new(formatting::isort()),
        Box::new(formatting::autopep8()),
        Box::new(formatting::docformatter()),
        Box::new(lint::darglint()),
        Box::new(documentation::Pdoc),
    ]
}

/// Names of the built-in adapters, in registration order.
pub fn builtin_tool_names() -> Vec<&'static str> {
    builtin_adapters().iter().map(|adapter| adapter.name()).collect()
}

/// Runs one adapter with fault isolation. Never panics and always returns a
/// result for `tool`.
pub fn run_adapter(tool: &RegisteredTool, ctx: &AdapterContext<'_>) -> ToolResult {
    let name = tool.name();
    let started = Instant::now();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| tool.adapter.run(ctx, &tool.settings)));
    let result = match outcome {
        Ok(Ok(parsed)) => {
            if parsed.dropped_lines > 0 {
                debug!(
                    tool = name,
                    file = ctx.canonical,
                    dropped = parsed.dropped_lines,
                    "Dropped malformed records"
                );
            }
            if parsed.foreign_records > 0 {
                debug!(
                    tool = name,
                    file = ctx.canonical,
                    foreign = parsed.foreign_records,
                    "Skipped records for other files"
                );
            }
            ToolResult::succeeded(name, parsed.issues)
                .with_summary(Some(parsed.summary))
                .with_dropped_lines(parsed.dropped_lines)
        }
        Ok(Err(failure)) => ToolResult::failed(name, failure),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            info!(tool = name, file = ctx.canonical, panic = %message, "Adapter panicked");
            ToolResult::failed(
                name,
                Failure::adapter_fault(format!("adapter panicked: {message}")),
            )
        }
    };

    debug!(
        tool = name,
        file = ctx.canonical,
        status = result.outcome.status_label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Adapter finished"
    );
    result
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Rejects exits that mean the tool itself broke: termination by signal or
/// one of `fault_codes`.
pub(crate) fn check_exit(
    invocation: &Invocation,
    program: &str,
    fault_codes: &[i32],
) -> Result<(), Failure> {
    match invocation.exit_code {
        None => Err(Failure::adapter_fault(format!(
            "{program} was terminated by a signal{}",
            stderr_suffix(invocation)
        ))),
        Some(code) if fault_codes.contains(&code) => Err(Failure::adapter_fault(format!(
            "{program} exited with code {code}{}",
            stderr_suffix(invocation)
        ))),
        Some(_) => Ok(()),
    }
}

/// A non-zero exit with nothing parsed and something on stderr is a tool
/// fault, not a clean file.
pub(crate) fn check_silent_failure(
    invocation: &Invocation,
    program: &str,
    parsed: &Parsed,
) -> Result<(), Failure> {
    let nothing_parsed = parsed.issues.is_empty() && parsed.summary.is_empty();
    if !invocation.succeeded() && nothing_parsed && !invocation.stderr.trim().is_empty() {
        return Err(Failure::adapter_fault(format!(
            "{program} exited with code {}{}",
            invocation.exit_code.unwrap_or(-1),
            stderr_suffix(invocation)
        )));
    }
    Ok(())
}

pub(crate) fn stderr_suffix(invocation: &Invocation) -> String {
    let stderr = tail(invocation.stderr.trim(), STDERR_TAIL_LINES);
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::*;
    use crate::invoke::InvokeError;
    use crate::paths::{CaseSensitivity, PathOptions};

    /// Returns canned invocations keyed by program, recording each request.
    #[derive(Default)]
    pub struct CannedInvoker {
        responses: HashMap<String, Vec<Result<Invocation, String>>>,
        pub requests: Mutex<Vec<InvokeRequest>>,
    }

    impl CannedInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, program: &str, invocation: Invocation) -> Self {
            self.responses
                .entry(program.to_string())
                .or_default()
                .push(Ok(invocation));
            self
        }

        pub fn missing(mut self, program: &str) -> Self {
            self.responses
                .entry(program.to_string())
                .or_default()
                .push(Err(program.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<InvokeRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ProcessInvoker for CannedInvoker {
        fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
            let index = {
                let mut requests = self.requests.lock().unwrap();
                let index = requests
                    .iter()
                    .filter(|seen| seen.program == request.program)
                    .count();
                requests.push(request.clone());
                index
            };
            let answers = self
                .responses
                .get(&request.program)
                .ok_or_else(|| InvokeError::NotFound {
                    program: request.program.clone(),
                })?;
            match answers.get(index).or_else(|| answers.last()) {
                Some(Ok(invocation)) => Ok(invocation.clone()),
                _ => Err(InvokeError::NotFound {
                    program: request.program.clone(),
                }),
            }
        }
    }

    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub file: PathBuf,
        pub canonical: String,
        pub reconciler: PathReconciler,
    }

    impl Fixture {
        /// A project root holding `pkg/mod.py`.
        pub fn new(source: &str) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let root = std::fs::canonicalize(dir.path()).unwrap();
            std::fs::create_dir_all(root.join("pkg")).unwrap();
            let file = root.join("pkg").join("mod.py");
            std::fs::write(&file, source).unwrap();
            let reconciler = PathReconciler::new(
                &root,
                PathOptions {
                    case_sensitivity: CaseSensitivity::Sensitive,
                    unify_separators: true,
                    resolve_symlinks: false,
                },
            );
            let canonical = reconciler.absolute(&file.to_string_lossy()).unwrap();
            Self {
                dir,
                file,
                canonical,
                reconciler,
            }
        }

        pub fn root(&self) -> &Path {
            self.file.parent().and_then(Path::parent).unwrap()
        }

        pub fn context<'a>(&'a self, invoker: &'a dyn ProcessInvoker) -> AdapterContext<'a> {
            AdapterContext {
                file: &self.file,
                canonical: &self.canonical,
                root: self.root(),
                reconciler: &self.reconciler,
                invoker,
                search_paths: &[],
            }
        }
    }

    pub fn settings(program: &str) -> ToolSettings {
        ToolSettings::new(program, Duration::from_secs(30))
    }

    pub fn run(
        adapter: &dyn ToolAdapter,
        fixture: &Fixture,
        invoker: &dyn ProcessInvoker,
    ) -> Result<Parsed, Failure> {
        adapter.run(&fixture.context(invoker), &settings(adapter.program()))
    }
}
