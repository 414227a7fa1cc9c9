//! Loading a Python file as an executable unit for profiling adapters.
//!
//! The unit computes the interpreter's module search path explicitly and
//! hands it to each child process through `PYTHONPATH`; nothing is written
//! to process-global state, and everything is released when the unit drops.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use pyreview_core::Failure;

use crate::invoke::InvokeRequest;
use crate::scratch::ScratchSpace;

/// A Python source file prepared for execution in isolation.
#[derive(Debug)]
pub struct ExecutableUnit {
    source: PathBuf,
    module: String,
    module_dir: PathBuf,
    search_path: Vec<PathBuf>,
    callables: Vec<String>,
    scratch: ScratchSpace,
}

impl ExecutableUnit {
    /// Loads `file`, prepending its directory and `search_paths` to the
    /// module search path.
    pub fn load(file: &Path, search_paths: &[PathBuf]) -> Result<Self, Failure> {
        let source_text = std::fs::read_to_string(file).map_err(|err| {
            Failure::adapter_fault(format!("cannot read {}: {err}", file.display()))
        })?;

        let module = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                Failure::adapter_fault(format!("no module name for {}", file.display()))
            })?
            .to_string();
        let module_dir = file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let mut search_path = vec![module_dir.clone()];
        search_path.extend(search_paths.iter().cloned());

        Ok(Self {
            source: file.to_path_buf(),
            module,
            module_dir,
            search_path,
            callables: top_level_callables(&source_text),
            scratch: ScratchSpace::create("unit")?,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn module_dir(&self) -> &Path {
        &self.module_dir
    }

    /// Public top-level functions, in definition order.
    pub fn callables(&self) -> &[String] {
        &self.callables
    }

    pub fn scratch(&self) -> &ScratchSpace {
        &self.scratch
    }

    /// `PYTHONPATH` value: module dir, caller additions, then any inherited
    /// entries.
    pub fn python_path(&self) -> OsString {
        let mut entries = self.search_path.clone();
        if let Some(inherited) = std::env::var_os("PYTHONPATH") {
            entries.extend(std::env::split_paths(&inherited));
        }
        std::env::join_paths(&entries).unwrap_or_else(|_| self.module_dir.clone().into_os_string())
    }

    /// A request running `program` inside the unit's scratch directory with
    /// the unit's search path.
    pub fn request(&self, program: &str, timeout: Duration) -> InvokeRequest {
        InvokeRequest::new(program, timeout)
            .cwd(self.scratch.path())
            .env("PYTHONPATH", self.python_path())
    }
}

fn top_level_callables(source: &str) -> Vec<String> {
    static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^(?:async[ \t]+)?def[ \t]+([A-Za-z]\w*)[ \t]*\(")
            .expect("static regex must compile")
    });
    DEF_RE
        .captures_iter(source)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}
