use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const BIN: &str = env!("CARGO_BIN_EXE_pyreview");

/// Program name that is never installed, so every run is deterministic.
const MISSING_PROGRAM: &str = "pyreview-test-missing-flake8";

fn pyreview(args: &[&str]) -> Output {
    Command::new(BIN)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run pyreview")
}

fn sample_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("app.py"), "import os\n").unwrap();
    fs::create_dir_all(dir.path().join("pkg")).unwrap();
    fs::write(dir.path().join("pkg/util.py"), "x = 1\n").unwrap();
    dir
}

/// Config that points flake8 at a program that does not exist.
fn write_missing_tool_config(dir: &Path) -> PathBuf {
    let path = dir.join("review.yml");
    let yaml = format!(
        r#"version: "1.0"
jobs: 2
timeout_secs: 10
tools:
  flake8:
    program: {MISSING_PROGRAM}
"#
    );
    fs::write(&path, yaml).unwrap();
    path
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn tools_lists_builtin_tools_in_registration_order() {
    let output = pyreview(&["tools"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let names: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    assert_eq!(names.first(), Some(&"pylint"));
    assert_eq!(names.last(), Some(&"pdoc"));
    assert_eq!(names.len(), 25);
    assert!(stdout.lines().any(|line| line.starts_with("pep8_naming") && line.contains("flake8")));
}

#[test]
fn tools_respects_disabled_entries() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("review.yml");
    fs::write(&config, "tools:\n  scalene:\n    enabled: false\n").unwrap();

    let output = pyreview(&["tools", "--config", arg(&config)]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(!stdout.contains("scalene"));
    assert_eq!(stdout.lines().count(), 24);
}

#[test]
fn init_config_writes_default_and_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".pyreview.yml");

    let output = pyreview(&["init-config", "--path", arg(&path)]);
    assert!(output.status.success());
    let written = fs::read_to_string(&path).unwrap();
    assert!(written.contains("timeout_secs: 120"));
    assert!(written.contains("python: python3"));

    let output = pyreview(&["init-config", "--path", arg(&path)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("already exists"));

    let output = pyreview(&["init-config", "--path", arg(&path), "--force"]);
    assert!(output.status.success());
}

#[test]
fn analyze_reports_missing_tool_as_failed_entry() {
    let project = sample_project();
    let scratch = tempfile::tempdir().unwrap();
    let config = write_missing_tool_config(scratch.path());

    let output = pyreview(&[
        "analyze",
        arg(project.path()),
        "--config",
        arg(&config),
        "--tools",
        "flake8",
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let bundle: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(bundle["tool_version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(bundle["schema_version"], "1.0.0");
    assert_eq!(bundle["report"]["complete"], true);

    let files = bundle["report"]["files"].as_object().unwrap();
    let keys: Vec<&String> = files.keys().collect();
    assert_eq!(keys, vec!["app.py", "pkg/util.py"]);
    let flake8 = &files["app.py"]["flake8"];
    assert_eq!(flake8["status"], "failed");
    assert_eq!(flake8["kind"], "tool_unavailable");
}

#[test]
fn analyze_merges_into_existing_report() {
    let project = sample_project();
    let scratch = tempfile::tempdir().unwrap();
    let config = write_missing_tool_config(scratch.path());

    let existing = scratch.path().join("previous.json");
    fs::write(
        &existing,
        r#"{"root": "/old", "complete": false, "files": {"legacy.py": {"error": "stale"}}}"#,
    )
    .unwrap();
    let report_path = scratch.path().join("out/report.json");

    let output = pyreview(&[
        "analyze",
        arg(project.path()),
        "--config",
        arg(&config),
        "--tools",
        "flake8",
        "--merge-into",
        arg(&existing),
        "--output",
        arg(&report_path),
    ]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Analyzed 3 file(s)"));

    let bundle: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let files = bundle["report"]["files"].as_object().unwrap();
    assert_eq!(files["legacy.py"]["error"], "stale");
    assert!(files.contains_key("app.py"));
    assert_eq!(bundle["report"]["complete"], true);
}

#[test]
fn file_renders_table() {
    let project = sample_project();
    let scratch = tempfile::tempdir().unwrap();
    let config = write_missing_tool_config(scratch.path());
    let file = project.path().join("app.py");

    let output = pyreview(&[
        "file",
        arg(&file),
        "--root",
        arg(project.path()),
        "--config",
        arg(&config),
        "--tools",
        "flake8",
        "--format",
        "table",
    ]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("flake8  FAIL [tool_unavailable]"));
}

#[test]
fn analyze_missing_root_exits_with_error() {
    let scratch = tempfile::tempdir().unwrap();
    let missing = scratch.path().join("does-not-exist");

    let output = pyreview(&["analyze", arg(&missing)]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error: "));
}

#[test]
fn unknown_tool_selection_is_rejected() {
    let project = sample_project();
    let output = pyreview(&["analyze", arg(project.path()), "--tools", "pylnt"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown tool 'pylnt'"));
}
