//! External process invocation.
//!
//! Adapters never spawn processes directly; they go through a
//! [`ProcessInvoker`] so tests can substitute canned output. A non-zero exit
//! code is data, not an error.

use std::ffi::OsString;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

use pyreview_core::Failure;

/// Captured result of one finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequest {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, OsString)>,
    pub timeout: Duration,
}

impl InvokeRequest {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// `program arg1 arg2 ...`, for logs and failure details.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Collaborator-level invocation faults.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{program}: command not found")]
    NotFound { program: String },
    #[error("{program} timed out after {}s", .timeout.as_secs_f64())]
    TimedOut { program: String, timeout: Duration },
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to wait on {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<InvokeError> for Failure {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NotFound { .. } => Failure::tool_unavailable(err.to_string()),
            InvokeError::TimedOut { .. } => Failure::timeout(err.to_string()),
            InvokeError::Spawn { .. } | InvokeError::Wait { .. } => {
                Failure::adapter_fault(err.to_string())
            }
        }
    }
}

/// Runs a command and captures its output.
pub trait ProcessInvoker: Send + Sync {
    fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError>;
}

/// Spawns real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInvoker;

impl ProcessInvoker for SystemInvoker {
    fn invoke(&self, request: &InvokeRequest) -> Result<Invocation, InvokeError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &request.env {
            command.env(key, value);
        }

        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                InvokeError::NotFound {
                    program: request.program.clone(),
                }
            } else {
                InvokeError::Spawn {
                    program: request.program.clone(),
                    source,
                }
            }
        })?;

        // Drain both pipes in the background so a chatty child cannot block
        // on a full pipe buffer before it exits.
        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        match child.wait_timeout(request.timeout) {
            Ok(Some(status)) => {
                let stdout = collect(stdout_thread, &request.program, "stdout");
                let stderr = collect(stderr_thread, &request.program, "stderr");
                debug!(
                    command = %request.command_line(),
                    exit_code = ?status.code(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Process finished"
                );
                Ok(Invocation {
                    exit_code: status.code(),
                    stdout,
                    stderr,
                })
            }
            Ok(None) => {
                debug!(
                    command = %request.command_line(),
                    timeout_ms = request.timeout.as_millis() as u64,
                    "Process timed out, killing"
                );
                let _ = child.kill();
                let _ = child.wait();
                settle_drains([stdout_thread, stderr_thread], &request.program);
                Err(InvokeError::TimedOut {
                    program: request.program.clone(),
                    timeout: request.timeout,
                })
            }
            Err(source) => {
                let _ = child.kill();
                let _ = child.wait();
                settle_drains([stdout_thread, stderr_thread], &request.program);
                Err(InvokeError::Wait {
                    program: request.program.clone(),
                    source,
                })
            }
        }
    }
}

type DrainHandle = JoinHandle<(Vec<u8>, std::io::Result<usize>)>;

/// How long a killed child's pipes may stay open before their readers are
/// detached.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

fn drain<R: Read + Send + 'static>(mut pipe: R) -> DrainHandle {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf);
        (buf, result)
    })
}

/// Joins the readers of a killed child within [`DRAIN_GRACE`]. A reader
/// whose pipe is still held by a surviving descendant is detached; it exits
/// once that descendant closes the pipe.
fn settle_drains(handles: [Option<DrainHandle>; 2], program: &str) {
    let deadline = Instant::now() + DRAIN_GRACE;
    while handles.iter().flatten().any(|handle| !handle.is_finished())
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(10));
    }
    for handle in handles.into_iter().flatten() {
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            debug!(program, "Output pipe still open after kill, detaching reader");
        }
    }
}

fn collect(handle: Option<DrainHandle>, program: &str, stream: &str) -> String {
    let buf = handle
        .and_then(|thread| thread.join().ok())
        .map(|(buf, result)| {
            if let Err(err) = result {
                debug!(program, stream, error = %err, "Failed to read child output");
            }
            buf
        })
        .unwrap_or_default();
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_is_data() {
        let request = InvokeRequest::new("sh", Duration::from_secs(10))
            .args(["-c", "echo out; echo err >&2; exit 3"]);
        let invocation = SystemInvoker.invoke(&request).unwrap();
        assert_eq!(invocation.exit_code, Some(3));
        assert_eq!(invocation.stdout.trim(), "out");
        assert_eq!(invocation.stderr.trim(), "err");
    }

    #[test]
    fn test_missing_binary_is_not_found() {
        let request = InvokeRequest::new("pyreview-no-such-binary", Duration::from_secs(5));
        let err = SystemInvoker.invoke(&request).unwrap_err();
        assert!(matches!(err, InvokeError::NotFound { .. }));
        let failure: Failure = err.into();
        assert_eq!(failure.kind, pyreview_core::FailureKind::ToolUnavailable);
    }

    #[test]
    fn test_timeout_kills_child() {
        let request =
            InvokeRequest::new("sh", Duration::from_millis(200)).args(["-c", "sleep 5"]);
        let started = Instant::now();
        let err = SystemInvoker.invoke(&request).unwrap_err();
        assert!(matches!(err, InvokeError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_timeout_returns_while_descendant_holds_pipes() {
        let request = InvokeRequest::new("sh", Duration::from_millis(200))
            .args(["-c", "sleep 5 & sleep 5"]);
        let started = Instant::now();
        let err = SystemInvoker.invoke(&request).unwrap_err();
        assert!(matches!(err, InvokeError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_cwd_and_env_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let request = InvokeRequest::new("sh", Duration::from_secs(10))
            .args(["-c", "pwd; echo $PYREVIEW_TEST_VAR"])
            .cwd(dir.path())
            .env("PYREVIEW_TEST_VAR", "hello");
        let invocation = SystemInvoker.invoke(&request).unwrap();
        assert!(invocation.stdout.contains("hello"));
        let first = invocation.stdout.lines().next().unwrap();
        assert_eq!(
            std::fs::canonicalize(first).unwrap(),
            std::fs::canonicalize(dir.path()).unwrap()
        );
    }
}
