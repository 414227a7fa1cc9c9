//! File and project aggregation.
//!
//! [`Analyzer::analyze_file`] runs every registered adapter for one file and
//! always returns exactly one result per adapter, in registration order.
//! [`Analyzer::analyze_project`] walks a root and records one entry per
//! discovered file; a file whose aggregation fails becomes an error leaf.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use pyreview_core::{FileReport, ProjectEntry, ProjectReport, ToolResult};

use crate::adapters::{AdapterContext, AdapterRegistry, panic_message, run_adapter};
use crate::config::ReviewConfig;
use crate::error::AnalysisError;
use crate::invoke::{ProcessInvoker, SystemInvoker};
use crate::paths::PathReconciler;
use crate::walk::PythonFiles;

/// Upper bound for the adaptive worker count. Every adapter spawns a
/// process, so more workers than this mostly adds contention.
const MAX_DEFAULT_JOBS: usize = 8;

/// Shared flag that stops a project walk from scheduling further files.
///
/// Files already being analyzed run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runs the registered adapters over files and projects on a bounded
/// worker pool.
pub struct Analyzer {
    config: ReviewConfig,
    registry: AdapterRegistry,
    invoker: Box<dyn ProcessInvoker>,
    pool: rayon::ThreadPool,
}

impl Analyzer {
    pub fn new(
        config: ReviewConfig,
        registry: AdapterRegistry,
        invoker: Box<dyn ProcessInvoker>,
    ) -> Result<Self, AnalysisError> {
        config.validate()?;
        let jobs = config
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(default_parallel_jobs);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|index| format!("pyreview-worker-{index}"))
            .build()?;
        debug!(jobs, tools = registry.len(), "Analyzer ready");
        Ok(Self {
            config,
            registry,
            invoker,
            pool,
        })
    }

    /// Built-in adapters configured by `config`, running real processes.
    pub fn from_config(config: ReviewConfig) -> Result<Self, AnalysisError> {
        let registry = AdapterRegistry::from_config(&config);
        Self::new(config, registry, Box::new(SystemInvoker))
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ReviewConfig {
        &self.config
    }

    pub fn jobs(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Report for one file. Relative paths in tool output resolve against
    /// `root`, which is also the working directory of every tool.
    pub fn analyze_file(&self, file: &Path, root: &Path) -> Result<FileReport, AnalysisError> {
        let session = Session::open(self, root)?;
        self.pool.install(|| session.analyze(file))
    }

    /// Reports for every Python file under `root`, keyed by root-relative
    /// path with `/` separators.
    ///
    /// Once `cancel` fires no further file is started and the report comes
    /// back with `complete: false`.
    pub fn analyze_project(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProjectReport, AnalysisError> {
        if !root.is_dir() {
            return Err(AnalysisError::InvalidInput(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        let session = Session::open(self, root)?;
        let files: Vec<PathBuf> = PythonFiles::new(&session.root)
            .exclude(self.config.exclude_dirs.iter().cloned())
            .iter()
            .collect();

        info!(
            root = %session.root.display(),
            files = files.len(),
            tools = self.registry.len(),
            jobs = self.jobs(),
            "Analyzing project"
        );
        let started = Instant::now();

        let outcomes: Vec<(String, Option<ProjectEntry>)> = self.pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let key = relative_key(&session.root, file);
                    if cancel.is_cancelled() {
                        return (key, None);
                    }
                    let entry = session.analyze_isolated(file);
                    (key, Some(entry))
                })
                .collect()
        });

        let mut complete = true;
        let mut entries = BTreeMap::new();
        for (key, entry) in outcomes {
            match entry {
                Some(entry) => {
                    entries.insert(key, entry);
                }
                None => complete = false,
            }
        }

        let report = ProjectReport::new(session.root.to_string_lossy(), complete, entries);
        info!(
            files = report.file_count(),
            issues = report.issue_count(),
            failures = report.failure_count(),
            errors = report.error_count(),
            complete,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Project analysis finished"
        );
        if !complete {
            warn!(skipped = files.len() - report.file_count(), "Analysis cancelled");
        }
        Ok(report)
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("tools", &self.registry.names())
            .field("jobs", &self.jobs())
            .finish_non_exhaustive()
    }
}

/// State shared by every file of one run under a single root.
struct Session<'a> {
    analyzer: &'a Analyzer,
    root: PathBuf,
    reconciler: PathReconciler,
    search_paths: Vec<PathBuf>,
}

impl<'a> Session<'a> {
    fn open(analyzer: &'a Analyzer, root: &Path) -> Result<Self, AnalysisError> {
        let root = std::path::absolute(root)?;
        let reconciler = PathReconciler::new(&root, analyzer.config.paths.clone());
        let search_paths = analyzer.config.resolved_search_paths(&root);
        Ok(Self {
            analyzer,
            root,
            reconciler,
            search_paths,
        })
    }

    fn analyze(&self, file: &Path) -> Result<FileReport, AnalysisError> {
        let file = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };
        if !file.is_file() {
            return Err(AnalysisError::InvalidInput(format!(
                "not a file: {}",
                file.display()
            )));
        }
        let canonical = self
            .reconciler
            .absolute(&file.to_string_lossy())
            .ok_or_else(|| {
                AnalysisError::InvalidInput(format!("unusable path: {}", file.display()))
            })?;

        let ctx = AdapterContext {
            file: &file,
            canonical: &canonical,
            root: &self.root,
            reconciler: &self.reconciler,
            invoker: self.analyzer.invoker.as_ref(),
            search_paths: &self.search_paths,
        };
        let results: Vec<ToolResult> = self
            .analyzer
            .registry
            .iter()
            .as_slice()
            .par_iter()
            .map(|tool| run_adapter(tool, &ctx))
            .collect();

        let report = FileReport::from_results(results);
        debug!(
            file = %canonical,
            issues = report.issue_count(),
            failures = report.failure_count(),
            "File analyzed"
        );
        Ok(report)
    }

    /// Like [`analyze`](Self::analyze), but any error or panic becomes the
    /// file's error leaf.
    fn analyze_isolated(&self, file: &Path) -> ProjectEntry {
        match panic::catch_unwind(AssertUnwindSafe(|| self.analyze(file))) {
            Ok(Ok(report)) => ProjectEntry::Report(report),
            Ok(Err(err)) => {
                warn!(file = %file.display(), error = %err, "File analysis failed");
                ProjectEntry::Error {
                    error: err.to_string(),
                }
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(file = %file.display(), panic = %message, "File analysis panicked");
                ProjectEntry::Error {
                    error: format!("analysis panicked: {message}"),
                }
            }
        }
    }
}

/// `file` relative to `root`, joined with `/`.
fn relative_key(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn default_parallel_jobs() -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|parallelism| parallelism.get())
        .unwrap_or(4);
    cpu_count.min(MAX_DEFAULT_JOBS).max(1)
}
