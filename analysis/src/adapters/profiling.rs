//! Profilers. Each run loads the file as an [`ExecutableUnit`] so the
//! interpreter sees the module's directory and configured search paths,
//! and works inside the unit's own scratch directory.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, stderr_suffix};
use crate::invoke::Invocation;
use crate::parser::json::{JsonShape, RecordKeys, extract, parse_document};
use crate::parser::table::{CPROFILE, parse_table};
use crate::parser::traceback::extract_traceback;
use crate::parser::{Parsed, number_value};
use crate::unit::ExecutableUnit;

/// Builds the failure for a run that produced no usable output.
fn run_failure(invocation: &Invocation, program: &str) -> Failure {
    let trace = extract_traceback(&invocation.stderr);
    if trace.is_unknown() {
        return Failure::adapter_fault(format!(
            "{program} exited with code {}{}",
            invocation.exit_code.unwrap_or(-1),
            stderr_suffix(invocation)
        ));
    }
    if trace.kind == "ModuleNotFoundError" {
        return Failure::tool_unavailable(format!("{}: {}", trace.kind, trace.message));
    }
    Failure::adapter_fault(format!("{}: {}", trace.kind, trace.message))
}

/// `python -m cProfile -s cumulative <file>`.
pub struct CProfile;

impl ToolAdapter for CProfile {
    fn name(&self) -> &'static str {
        "cprofile"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Performance
    }

    fn program(&self) -> &'static str {
        "python3"
    }

    fn runs_interpreter(&self) -> bool {
        true
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let unit = ExecutableUnit::load(ctx.file, ctx.search_paths)?;
        let request = unit
            .request(&settings.program, settings.timeout)
            .args(settings.extra_args.iter().cloned())
            .args(["-m", "cProfile", "-s", "cumulative"])
            .arg(ctx.file_arg());
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;
        if !invocation.succeeded() {
            return Err(run_failure(&invocation, &settings.program));
        }

        let table = parse_table(&invocation.stdout, &CPROFILE)
            .ok_or_else(|| Failure::invalid_format("no pstats listing in cProfile output"))?;

        let target = ctx.target();
        let mut parsed = Parsed {
            dropped_lines: table.skipped_rows,
            ..Parsed::default()
        };
        for row in table.rows {
            let Some((file, line, function)) = split_location(&row.key) else {
                parsed.foreign_records += 1;
                continue;
            };
            if !target.owns(file) {
                parsed.foreign_records += 1;
                continue;
            }
            let mut issue = IssueRecord::new(ctx.canonical, function)
                .with_position(line, None)
                .with_kind("profile");
            issue.extra = row.cells;
            parsed.issues.push(issue);
        }

        if let Some((calls, seconds)) = call_totals(&invocation.stdout) {
            parsed.summary.insert("function_calls".to_string(), calls);
            parsed.summary.insert("total_seconds".to_string(), seconds);
        }
        Ok(parsed)
    }
}

/// `path:line(function)` as printed by pstats.
fn split_location(location: &str) -> Option<(&str, Option<u32>, &str)> {
    static LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"^(.+):(\d+)\((.+)\)$").expect("static regex must compile")
    });
    let caps = LOCATION_RE.captures(location)?;
    let file = caps.get(1)?.as_str();
    let line = caps.get(2)?.as_str().parse().ok().filter(|line| *line > 0);
    let function = caps.get(3)?.as_str();
    Some((file, line, function))
}

fn call_totals(stdout: &str) -> Option<(Value, Value)> {
    static TOTALS_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^\s*(\d+)\s+function calls.*?in\s+([\d.]+)\s+seconds")
            .expect("static regex must compile")
    });
    let caps = TOTALS_RE.captures(stdout)?;
    Some((
        number_value(caps.get(1)?.as_str())?,
        number_value(caps.get(2)?.as_str())?,
    ))
}

const DRIVER_PRELUDE: &str = r#"
import importlib.util
import json
import sys


def load_module(source, name):
    spec = importlib.util.spec_from_file_location(name, source)
    if spec is None or spec.loader is None:
        raise ImportError("cannot import " + source)
    module = importlib.util.module_from_spec(spec)
    sys.modules[name] = module
    spec.loader.exec_module(module)
    return module


def failure(source, function, exc):
    return {"file": source, "function": function, "kind": "error",
            "message": "%s: %s" % (type(exc).__name__, exc)}


source, module_name, output = sys.argv[1], sys.argv[2], sys.argv[3]
functions = sys.argv[4:]
module = load_module(source, module_name)
records = []
"#;

const DRIVER_EPILOGUE: &str = r#"
with open(output, "w", encoding="utf-8") as handle:
    json.dump(records, handle)
"#;

const LINE_PROFILER_BODY: &str = r#"
for function in functions:
    func = getattr(module, function, None)
    if not callable(func):
        continue
    profiler = LineProfiler()
    try:
        profiler(func)()
    except Exception as exc:
        records.append(failure(source, function, exc))
        continue
    stats = profiler.get_stats()
    for (filename, _, name), timings in stats.timings.items():
        for lineno, hits, elapsed in timings:
            records.append({"file": filename, "function": name, "line": lineno,
                            "kind": "line_timing", "message": name, "hits": hits,
                            "time_microseconds": elapsed * stats.unit * 1e6})
"#;

const MEMORY_PROFILER_BODY: &str = r#"
for function in functions:
    func = getattr(module, function, None)
    if not callable(func):
        continue
    try:
        samples = memory_usage((func, (), {}), interval=0.01)
    except Exception as exc:
        records.append(failure(source, function, exc))
        continue
    code = getattr(func, "__code__", None)
    records.append({"file": source, "function": function,
                    "line": code.co_firstlineno if code else None,
                    "kind": "memory", "message": function,
                    "peak_mib": max(samples) if samples else 0.0,
                    "baseline_mib": samples[0] if samples else 0.0,
                    "samples": len(samples)})
"#;

const DRIVER_SHAPE: JsonShape = JsonShape::FlatList {
    container: None,
    path: Some("file"),
    keys: RecordKeys {
        line: Some("line"),
        kind: Some("kind"),
        message: &["message"],
        fallback_message: "profiled",
        ..RecordKeys::EMPTY
    },
};

const DRIVER_OUTPUT: &str = "profile.json";

/// Runs a generated driver that calls every top-level function of the
/// module under a profiler and writes JSON records.
pub struct DriverTool {
    name: &'static str,
    /// Import line for the profiler library.
    import: &'static str,
    body: &'static str,
}

impl DriverTool {
    fn source(&self) -> String {
        format!("{}\n{DRIVER_PRELUDE}{}{DRIVER_EPILOGUE}", self.import, self.body)
    }
}

impl ToolAdapter for DriverTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Performance
    }

    fn program(&self) -> &'static str {
        "python3"
    }

    fn runs_interpreter(&self) -> bool {
        true
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let unit = ExecutableUnit::load(ctx.file, ctx.search_paths)?;
        if unit.callables().is_empty() {
            return Ok(Parsed::default().with_summary("note", "no top-level functions to profile"));
        }

        let driver = unit.scratch().file(&format!("{}_driver.py", self.name));
        std::fs::write(&driver, self.source())
            .map_err(|err| Failure::adapter_fault(format!("cannot write profiler driver: {err}")))?;
        let output = unit.scratch().file(DRIVER_OUTPUT);

        let request = unit
            .request(&settings.program, settings.timeout)
            .args(settings.extra_args.iter().cloned())
            .arg(driver.to_string_lossy())
            .arg(ctx.file_arg())
            .arg(unit.module())
            .arg(output.to_string_lossy())
            .args(unit.callables().iter().cloned());
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;

        let Some(json) = unit.scratch().read(DRIVER_OUTPUT) else {
            return Err(run_failure(&invocation, &settings.program));
        };
        let document = parse_document(&json)?;
        extract(&document, &DRIVER_SHAPE, ctx.target())
    }
}

pub fn line_profiler() -> DriverTool {
    DriverTool {
        name: "line_profiler",
        import: "from line_profiler import LineProfiler",
        body: LINE_PROFILER_BODY,
    }
}

pub fn memory_profiler() -> DriverTool {
    DriverTool {
        name: "memory_profiler",
        import: "from memory_profiler import memory_usage",
        body: MEMORY_PROFILER_BODY,
    }
}

const SCALENE_SHAPE: JsonShape = JsonShape::PathKeyed {
    container: Some("files"),
    records: Some("lines"),
    keys: RecordKeys {
        line: Some("lineno"),
        message: &["line"],
        fallback_message: "source line",
        ..RecordKeys::EMPTY
    },
};

/// Per-line fields that mark a line as doing measurable work.
const SCALENE_ACTIVITY: &[&str] = &[
    "n_cpu_percent_python",
    "n_cpu_percent_c",
    "n_sys_percent",
    "n_malloc_mb",
    "n_peak_mb",
];

pub struct Scalene;

impl ToolAdapter for Scalene {
    fn name(&self) -> &'static str {
        "scalene"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Performance
    }

    fn program(&self) -> &'static str {
        "scalene"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let unit = ExecutableUnit::load(ctx.file, ctx.search_paths)?;
        let output = unit.scratch().file("scalene.json");
        let request = unit
            .request(&settings.program, settings.timeout)
            .args(["--json", "--outfile"])
            .arg(output.to_string_lossy())
            .args(settings.extra_args.iter().cloned())
            .arg(ctx.file_arg());
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;

        let Some(json) = unit.scratch().read("scalene.json") else {
            return Err(run_failure(&invocation, &settings.program));
        };
        let document = parse_document(&json)?;
        let mut parsed = extract(&document, &SCALENE_SHAPE, ctx.target())?;
        parsed.issues.retain(|issue| {
            SCALENE_ACTIVITY.iter().any(|key| {
                issue
                    .extra
                    .get(*key)
                    .and_then(Value::as_f64)
                    .is_some_and(|value| value > 0.0)
            })
        });
        for issue in &mut parsed.issues {
            issue.kind = Some("hotspot".to_string());
        }

        if let Some(top) = document.as_object() {
            for (key, value) in top {
                if matches!(value, Value::Number(_) | Value::String(_) | Value::Bool(_)) {
                    parsed.summary.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;
    use crate::invoke::{InvokeError, InvokeRequest, ProcessInvoker};
    use pyreview_core::FailureKind;
    use serde_json::json;

    const SOURCE: &str = "def fib(n):\n    return n if n < 2 else fib(n - 1) + fib(n - 2)\n\nfib(3)\n";

    #[test]
    fn test_cprofile_keeps_rows_for_target() {
        let fixture = Fixture::new(SOURCE);
        let stdout = format!(
            "         6 function calls (2 primitive calls) in 0.000 seconds\n\
             \n   Ordered by: cumulative time\n\n   \
             ncalls  tottime  percall  cumtime  percall filename:lineno(function)\n        \
             1    0.000    0.000    0.000    0.000 {{built-in method builtins.exec}}\n        \
             1    0.000    0.000    0.000    0.000 {path}:1(<module>)\n      \
             5/1    0.000    0.000    0.000    0.000 {path}:1(fib)\n\n",
            path = fixture.canonical
        );
        let invoker = CannedInvoker::new().respond("python3", Invocation::new(0, stdout, ""));
        let parsed = run(&CProfile, &fixture, &invoker).unwrap();

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[1].message, "fib");
        assert_eq!(parsed.issues[1].line, Some(1));
        assert_eq!(parsed.issues[1].extra["ncalls"], "5/1");
        assert_eq!(parsed.foreign_records, 1);
        assert_eq!(parsed.summary["function_calls"], 6);

        let request = &invoker.requests()[0];
        let pythonpath = request.env.iter().find(|(key, _)| key == "PYTHONPATH");
        assert!(pythonpath.is_some());
        assert_ne!(request.cwd.as_deref(), Some(fixture.root()));
    }

    #[test]
    fn test_cprofile_script_error_uses_traceback() {
        let fixture = Fixture::new(SOURCE);
        let stderr = "Traceback (most recent call last):\n  File \"mod.py\", line 4\nZeroDivisionError: division by zero\n";
        let invoker = CannedInvoker::new().respond("python3", Invocation::new(1, "", stderr));
        let failure = run(&CProfile, &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
        assert_eq!(failure.detail, "ZeroDivisionError: division by zero");
    }

    /// Answers like a driver run: writes `records` to the output argument.
    struct DriverInvoker {
        records: Value,
    }

    impl ProcessInvoker for DriverInvoker {
        fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
            // driver, source, module, output, functions...
            let driver = std::path::Path::new(&request.args[0]);
            assert!(driver.exists());
            assert_eq!(request.args[2], "mod");
            assert_eq!(request.args[4..], ["fib"]);
            std::fs::write(&request.args[3], self.records.to_string()).unwrap();
            Ok(Invocation::new(0, "", ""))
        }
    }

    #[test]
    fn test_line_profiler_records() {
        let fixture = Fixture::new(SOURCE);
        let invoker = DriverInvoker {
            records: json!([
                {"file": fixture.canonical.clone(), "function": "fib", "line": 2,
                 "kind": "line_timing", "message": "fib", "hits": 9, "time_microseconds": 4.5},
                {"file": "/usr/lib/python3/functools.py", "function": "wrapper", "line": 10,
                 "kind": "line_timing", "message": "wrapper", "hits": 1, "time_microseconds": 1.0}
            ]),
        };
        let parsed = run(&line_profiler(), &fixture, &invoker).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].line, Some(2));
        assert_eq!(parsed.issues[0].kind.as_deref(), Some("line_timing"));
        assert_eq!(parsed.issues[0].extra["hits"], json!(9.0));
        assert_eq!(parsed.foreign_records, 1);
    }

    #[test]
    fn test_memory_profiler_missing_library_is_unavailable() {
        let fixture = Fixture::new(SOURCE);
        let stderr = "Traceback (most recent call last):\n  File \"memory_profiler_driver.py\", line 1, in <module>\nModuleNotFoundError: No module named 'memory_profiler'\n";
        let invoker = CannedInvoker::new().respond("python3", Invocation::new(1, "", stderr));
        let failure = run(&memory_profiler(), &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::ToolUnavailable);
    }

    #[test]
    fn test_driver_without_functions_is_noted() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new();
        let parsed = run(&line_profiler(), &fixture, &invoker).unwrap();
        assert!(parsed.issues.is_empty());
        assert!(parsed.summary.contains_key("note"));
        assert!(invoker.requests().is_empty());
    }

    #[test]
    fn test_scalene_hot_lines_and_summary() {
        let fixture = Fixture::new(SOURCE);
        let canonical = fixture.canonical.clone();
        let report = json!({
            "elapsed_time_sec": 0.5,
            "max_footprint_mb": 12.0,
            "files": {
                canonical: {
                    "percent_cpu_time": 100.0,
                    "lines": [
                        {"lineno": 1, "line": "def fib(n):\n", "n_cpu_percent_python": 0.0, "n_peak_mb": 0.0},
                        {"lineno": 2, "line": "    return n if n < 2 else fib(n - 1) + fib(n - 2)\n",
                         "n_cpu_percent_python": 80.0, "n_peak_mb": 0.0}
                    ]
                }
            }
        });

        struct ScaleneInvoker(Value);
        impl ProcessInvoker for ScaleneInvoker {
            fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
                std::fs::write(&request.args[2], self.0.to_string()).unwrap();
                Ok(Invocation::new(0, "", ""))
            }
        }

        let parsed = run(&Scalene, &fixture, &ScaleneInvoker(report)).unwrap();
        assert_eq!(parsed.issues.len(), 1);
        assert_eq!(parsed.issues[0].line, Some(2));
        assert_eq!(parsed.issues[0].kind.as_deref(), Some("hotspot"));
        assert_eq!(parsed.summary["elapsed_time_sec"], json!(0.5));
        assert!(!parsed.summary.contains_key("files"));
    }
}
