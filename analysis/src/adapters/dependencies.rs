//! Project dependency checks. These tools look at the whole project; their
//! findings are attributed to the file under review.

use serde_json::{Map, Value};

use pyreview_core::{Failure, IssueRecord};

use super::{AdapterContext, ToolAdapter, ToolCategory, ToolSettings, check_exit, stderr_suffix};
use crate::parser::Parsed;
use crate::parser::json::{JsonShape, RecordKeys, extract_any, parse_document};
use crate::parser::traceback::extract_traceback;
use crate::scratch::ScratchSpace;

const MISSING_SPEC_ERROR: &str = "DependencySpecificationNotFoundError";

/// Current `deptry` output first, then the older path-keyed layout.
const DEPTRY_SHAPES: &[JsonShape] = &[
    JsonShape::FlatList {
        container: None,
        path: Some("location.file"),
        keys: RecordKeys {
            line: Some("location.line"),
            column: Some("location.column"),
            zero_based_column: false,
            code: Some("error.code"),
            kind: None,
            message: &["error.message"],
            fallback_message: "dependency issue",
            renames: &[],
        },
    },
    JsonShape::PathKeyedNested { tool: "deptry" },
];

pub struct Pipreqs;

impl ToolAdapter for Pipreqs {
    fn name(&self) -> &'static str {
        "pipreqs"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Dependencies
    }

    fn program(&self) -> &'static str {
        "pipreqs"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let scratch = ScratchSpace::create("pipreqs")?;
        let savepath = scratch.file("requirements.txt");
        let request = ctx.request(
            settings,
            [
                ctx.root_arg(),
                "--savepath".to_string(),
                savepath.to_string_lossy().into_owned(),
            ],
        );
        let invocation = ctx.invoke(&request)?;
        if !invocation.succeeded() {
            return Err(Failure::adapter_fault(format!(
                "{} exited with code {}{}",
                settings.program,
                invocation.exit_code.unwrap_or(-1),
                stderr_suffix(&invocation)
            )));
        }

        let written = scratch
            .read("requirements.txt")
            .ok_or_else(|| Failure::adapter_fault("pipreqs did not write a requirements file"))?;
        let requirements: Vec<Value> = written
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| Value::String(line.to_string()))
            .collect();

        Ok(Parsed::default().with_summary("requirements", requirements))
    }
}

/// Known vulnerabilities in installed packages.
pub struct PipAudit;

impl ToolAdapter for PipAudit {
    fn name(&self) -> &'static str {
        "pip-audit"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Dependencies
    }

    fn program(&self) -> &'static str {
        "pip-audit"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let request = ctx.request(settings, ["--format", "json"]);
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;
        if !invocation.succeeded() && invocation.stdout.trim().is_empty() {
            return Err(Failure::adapter_fault(format!(
                "{} exited with code {}{}",
                settings.program,
                invocation.exit_code.unwrap_or(-1),
                stderr_suffix(&invocation)
            )));
        }

        let document = parse_document(&invocation.stdout)?;
        audit_issues(&document, ctx.canonical)
    }
}

fn audit_issues(document: &Value, canonical: &str) -> Result<Parsed, Failure> {
    let dependencies = document
        .get("dependencies")
        .unwrap_or(document)
        .as_array()
        .ok_or_else(|| Failure::invalid_format("expected a list of dependencies"))?;

    let mut parsed = Parsed::default();
    let mut vulnerable = 0u64;
    for dependency in dependencies {
        let Some(dependency) = dependency.as_object() else {
            parsed.dropped_lines += 1;
            continue;
        };
        let name = text(dependency, "name").unwrap_or("unknown");
        let version = text(dependency, "version").unwrap_or("");
        let vulns = dependency.get("vulns").and_then(Value::as_array);
        let Some(vulns) = vulns.filter(|vulns| !vulns.is_empty()) else {
            continue;
        };
        vulnerable += 1;

        for vuln in vulns.iter().filter_map(Value::as_object) {
            let id = text(vuln, "id").unwrap_or("unknown");
            let message = text(vuln, "description")
                .filter(|description| !description.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{name} {version} is affected by {id}"));

            let mut issue = IssueRecord::new(canonical, message)
                .with_code(id)
                .with_kind("vulnerability")
                .with_extra("package", name)
                .with_extra("version", version);
            for key in ["fix_versions", "aliases"] {
                if let Some(value) = vuln.get(key) {
                    issue.extra.insert(key.to_string(), value.clone());
                }
            }
            parsed.issues.push(issue);
        }
    }

    Ok(parsed
        .with_summary("dependencies", dependencies.len() as u64)
        .with_summary("vulnerable", vulnerable))
}

fn text<'v>(map: &'v Map<String, Value>, key: &str) -> Option<&'v str> {
    map.get(key).and_then(Value::as_str)
}

/// Missing, unused and transitive dependencies.
pub struct Deptry;

impl ToolAdapter for Deptry {
    fn name(&self) -> &'static str {
        "deptry"
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Dependencies
    }

    fn program(&self) -> &'static str {
        "deptry"
    }

    fn run(&self, ctx: &AdapterContext<'_>, settings: &ToolSettings) -> Result<Parsed, Failure> {
        let scratch = ScratchSpace::create("deptry")?;
        let output = scratch.file("deptry.json");
        let request = ctx.request(
            settings,
            [
                ctx.root_arg(),
                "--json-output".to_string(),
                output.to_string_lossy().into_owned(),
            ],
        );
        let invocation = ctx.invoke(&request)?;
        check_exit(&invocation, &settings.program, &[])?;

        match scratch.read("deptry.json").filter(|json| !json.trim().is_empty()) {
            Some(json) => {
                let document = parse_document(&json)?;
                let mut parsed = extract_any(&document, DEPTRY_SHAPES, ctx.target())?;
                for issue in &mut parsed.issues {
                    condense_traceback(issue);
                }
                Ok(parsed)
            }
            None if invocation.succeeded() => Ok(Parsed::default()),
            None => {
                let trace = extract_traceback(&invocation.stderr);
                if trace.is_unknown() {
                    return Err(Failure::adapter_fault(format!(
                        "{} exited with code {}{}",
                        settings.program,
                        invocation.exit_code.unwrap_or(-1),
                        stderr_suffix(&invocation)
                    )));
                }
                let issue = IssueRecord::new(ctx.canonical, &trace.message)
                    .with_kind(trace.kind.as_str())
                    .with_extra("missing_dependency_file", trace.kind == MISSING_SPEC_ERROR);
                Ok(Parsed::from_issues(vec![issue]))
            }
        }
    }
}

/// Replaces a traceback message with its final exception line.
fn condense_traceback(issue: &mut IssueRecord) {
    if !issue.message.contains('\n') {
        return;
    }
    let trace = extract_traceback(&issue.message);
    if trace.is_unknown() {
        return;
    }
    issue
        .extra
        .insert("missing_dependency_file".to_string(), (trace.kind == MISSING_SPEC_ERROR).into());
    issue.message = trace.message;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_support::*;
    use crate::invoke::Invocation;
    use pyreview_core::FailureKind;
    use serde_json::json;

    #[test]
    fn test_pip_audit_one_issue_per_vulnerability() {
        let fixture = Fixture::new("x = 1\n");
        let stdout = json!({
            "dependencies": [
                {"name": "jinja2", "version": "2.10", "vulns": [
                    {"id": "PYSEC-2019-217", "fix_versions": ["2.10.1"], "aliases": ["CVE-2019-10906"], "description": ""},
                    {"id": "PYSEC-2021-66", "fix_versions": ["2.11.3"], "aliases": [], "description": "ReDoS in urlize"}
                ]},
                {"name": "requests", "version": "2.31.0", "vulns": []}
            ],
            "fixes": []
        })
        .to_string();
        let invoker = CannedInvoker::new().respond("pip-audit", Invocation::new(1, stdout, ""));
        let parsed = run(&PipAudit, &fixture, &invoker).unwrap();

        assert_eq!(parsed.issues.len(), 2);
        assert_eq!(parsed.issues[0].message, "jinja2 2.10 is affected by PYSEC-2019-217");
        assert_eq!(parsed.issues[1].message, "ReDoS in urlize");
        assert_eq!(parsed.issues[1].extra["fix_versions"], json!(["2.11.3"]));
        assert_eq!(parsed.summary["dependencies"], 2);
        assert_eq!(parsed.summary["vulnerable"], 1);
    }

    #[test]
    fn test_deptry_flat_list_from_scratch_file() {
        let fixture = Fixture::new("import requests\n");
        let invoker = WritingInvoker {
            flag: "--json-output",
            contents: Some(
                json!([
                    {"error": {"code": "DEP001", "message": "'requests' imported but missing from the dependency definitions"},
                     "module": "requests",
                     "location": {"file": "pkg/mod.py", "line": 1, "column": 8}},
                    {"error": {"code": "DEP002", "message": "'six' defined as a dependency but not used in the codebase"},
                     "module": "six",
                     "location": {"file": "pyproject.toml", "line": null, "column": null}}
                ])
                .to_string(),
            ),
            invocation: Invocation::new(1, "", ""),
        };
        let parsed = run(&Deptry, &fixture, &invoker).unwrap();

        assert_eq!(parsed.issues.len(), 1);
        let issue = &parsed.issues[0];
        assert_eq!(issue.code.as_deref(), Some("DEP001"));
        assert_eq!((issue.line, issue.column), (Some(1), Some(8)));
        assert_eq!(issue.extra["module"], "requests");
        assert_eq!(parsed.foreign_records, 1);
    }

    #[test]
    fn test_deptry_traceback_without_json() {
        let fixture = Fixture::new("x = 1\n");
        let stderr = "\
Traceback (most recent call last):
  File \"/usr/bin/deptry\", line 8, in <module>
deptry.exceptions.DependencySpecificationNotFoundError: No file called 'pyproject.toml' found
";
        let invoker = CannedInvoker::new().respond("deptry", Invocation::new(1, "", stderr));
        let parsed = run(&Deptry, &fixture, &invoker).unwrap();

        let issue = &parsed.issues[0];
        assert_eq!(issue.kind.as_deref(), Some(MISSING_SPEC_ERROR));
        assert_eq!(issue.message, "No file called 'pyproject.toml' found");
        assert_eq!(issue.extra["missing_dependency_file"], true);
    }

    #[test]
    fn test_deptry_unrecognized_crash_is_fault() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new().respond("deptry", Invocation::new(2, "", "segfault"));
        let failure = run(&Deptry, &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
    }

    #[test]
    fn test_pipreqs_nonzero_exit_is_fault() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = CannedInvoker::new()
            .respond("pipreqs", Invocation::new(1, "", "ERROR: Failed on file"));
        let failure = run(&Pipreqs, &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
        assert!(failure.detail.contains("Failed on file"));
    }

    #[test]
    fn test_pipreqs_collects_requirements_from_savepath() {
        let fixture = Fixture::new("import requests\n");
        let invoker = WritingInvoker {
            flag: "--savepath",
            contents: Some(
                "# generated by pipreqs\nrequests==2.31.0\n\n  numpy==1.26.4  \n".to_string(),
            ),
            invocation: Invocation::new(0, "", "INFO: Successfully saved requirements file"),
        };
        let parsed = run(&Pipreqs, &fixture, &invoker).unwrap();

        assert!(parsed.issues.is_empty());
        assert_eq!(
            parsed.summary["requirements"],
            json!(["requests==2.31.0", "numpy==1.26.4"])
        );
    }

    #[test]
    fn test_pipreqs_without_savepath_file_is_fault() {
        let fixture = Fixture::new("x = 1\n");
        let invoker = WritingInvoker {
            flag: "--savepath",
            contents: None,
            invocation: Invocation::new(0, "", ""),
        };
        let failure = run(&Pipreqs, &fixture, &invoker).unwrap_err();
        assert_eq!(failure.kind, FailureKind::AdapterFault);
        assert!(failure.detail.contains("did not write a requirements file"));
    }

    /// Writes `contents` to the path following `flag`, then answers.
    struct WritingInvoker {
        flag: &'static str,
        contents: Option<String>,
        invocation: Invocation,
    }

    impl crate::invoke::ProcessInvoker for WritingInvoker {
        fn invoke(
            &self,
            request: &crate::invoke::InvokeRequest,
        ) -> Result<Invocation, crate::invoke::InvokeError> {
            let target = request
                .args
                .iter()
                .position(|arg| arg == self.flag)
                .and_then(|index| request.args.get(index + 1));
            if let (Some(path), Some(contents)) = (target, &self.contents) {
                std::fs::write(path, contents).unwrap();
            }
            Ok(self.invocation.clone())
        }
    }
}
