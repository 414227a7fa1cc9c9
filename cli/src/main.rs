use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use pyreview_analysis::config::DEFAULT_CONFIG_FILE;
use pyreview_analysis::output::{format_file_report, format_project_bundle};
use pyreview_analysis::{
    AdapterRegistry, Analyzer, CancellationToken, OutputFormat, ReportBundle, ReviewConfig,
    build_report_bundle,
};
use pyreview_core::{MergeStrategy, ProjectReport, merge_project_reports};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI-side merge strategy with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMergeStrategy {
    Base,
    Overlay,
    Successful,
}

impl From<CliMergeStrategy> for MergeStrategy {
    fn from(strategy: CliMergeStrategy) -> Self {
        match strategy {
            CliMergeStrategy::Base => Self::PreferBase,
            CliMergeStrategy::Overlay => Self::PreferOverlay,
            CliMergeStrategy::Successful => Self::PreferSuccessful,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "pyreview", version)]
#[command(about = "Run Python analysis tools and merge their findings into one report")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze every Python file under a project root.
    Analyze(AnalyzeArgs),
    /// Analyze a single file.
    File(FileArgs),
    /// List the registered tools in report order.
    Tools(ToolsArgs),
    /// Write the default configuration file.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct RunOptions {
    /// Configuration file (default: <root>/.pyreview.yml when present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of parallel workers (default: min(CPUs, 8)).
    #[arg(long)]
    jobs: Option<usize>,
    /// Per-tool timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Comma-separated subset of tools to run (e.g. pylint,mypy).
    #[arg(long, value_delimiter = ',')]
    tools: Vec<String>,
    /// Output format.
    #[arg(long, default_value = "json")]
    format: OutputFormat,
    /// Write the report here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    /// Project root to walk.
    root: PathBuf,
    #[command(flatten)]
    options: RunOptions,
    /// Merge the new report into an existing JSON report (bare or bundled).
    #[arg(long)]
    merge_into: Option<PathBuf>,
    /// Which entry wins when a file appears in both reports.
    #[arg(long, default_value = "successful")]
    merge_strategy: CliMergeStrategy,
}

#[derive(Debug, Args)]
struct FileArgs {
    /// Python file to analyze.
    path: PathBuf,
    /// Project root tools run from (default: current directory).
    #[arg(long)]
    root: Option<PathBuf>,
    #[command(flatten)]
    options: RunOptions,
}

#[derive(Debug, Args)]
struct ToolsArgs {
    /// Configuration file whose overrides apply.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Destination path.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    path: PathBuf,
    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::File(args) => run_file(args),
        Command::Tools(args) => run_tools(args),
        Command::InitConfig(args) => run_init_config(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_analyze(args: AnalyzeArgs) -> Result<(), String> {
    let analyzer = build_analyzer(&args.root, &args.options)?;
    let report = analyzer
        .analyze_project(&args.root, &CancellationToken::new())
        .map_err(|e| e.to_string())?;

    let report = match &args.merge_into {
        Some(existing) => {
            let base = load_project_report(existing)?;
            info!(base = %existing.display(), "Merging into existing report");
            merge_project_reports(&base, &report, args.merge_strategy.into())
        }
        None => report,
    };

    let bundle = build_report_bundle(PACKAGE_VERSION, report);
    let rendered = format_project_bundle(&bundle, args.options.format)?;
    emit(&rendered, args.options.output.as_deref())?;

    if args.options.output.is_some() {
        eprintln!(
            "Analyzed {} file(s): {} issue(s), {} tool failure(s), {} file error(s)",
            bundle.report.file_count(),
            bundle.report.issue_count(),
            bundle.report.failure_count(),
            bundle.report.error_count()
        );
    }
    Ok(())
}

fn run_file(args: FileArgs) -> Result<(), String> {
    let root = match args.root {
        Some(root) => root,
        None => std::env::current_dir().map_err(|e| format!("cannot read current directory: {e}"))?,
    };
    let file = std::path::absolute(&args.path)
        .map_err(|e| format!("invalid path {}: {e}", args.path.display()))?;
    let analyzer = build_analyzer(&root, &args.options)?;
    let report = analyzer
        .analyze_file(&file, &root)
        .map_err(|e| e.to_string())?;

    let label = args.path.display().to_string();
    let rendered = format_file_report(&label, &report, args.options.format)?;
    emit(&rendered, args.options.output.as_deref())
}

fn run_tools(args: ToolsArgs) -> Result<(), String> {
    let config = load_config(Path::new("."), args.config.as_deref())?;
    let registry = AdapterRegistry::from_config(&config);

    let max_name = registry
        .iter()
        .map(|tool| tool.name().len())
        .max()
        .unwrap_or(4);
    for tool in &registry {
        println!(
            "{:<width$}  {:<13}  {}",
            tool.name(),
            tool.category().to_string(),
            tool.settings().program,
            width = max_name
        );
    }
    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<(), String> {
    if args.path.exists() && !args.force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            args.path.display()
        ));
    }
    ReviewConfig::default()
        .save(&args.path)
        .map_err(|e| format!("failed to write {}: {e}", args.path.display()))?;
    eprintln!("Wrote {}", args.path.display());
    Ok(())
}

fn load_config(root: &Path, explicit: Option<&Path>) -> Result<ReviewConfig, String> {
    let config = match explicit {
        Some(path) => ReviewConfig::load(path),
        None => ReviewConfig::load_or_default(root),
    };
    config.map_err(|e| format!("failed to load configuration: {e}"))
}

fn build_analyzer(root: &Path, options: &RunOptions) -> Result<Analyzer, String> {
    let mut config = load_config(root, options.config.as_deref())?;
    if let Some(jobs) = options.jobs {
        config.jobs = Some(jobs);
    }
    if let Some(timeout) = options.timeout {
        config.timeout_secs = timeout;
    }

    let mut registry = AdapterRegistry::from_config(&config);
    if !options.tools.is_empty() {
        registry = registry.select(&options.tools).map_err(|e| e.to_string())?;
    }
    Analyzer::new(config, registry, Box::new(pyreview_analysis::SystemInvoker))
        .map_err(|e| e.to_string())
}

/// Reads a project report written by an earlier run, bundled or bare.
fn load_project_report(path: &Path) -> Result<ProjectReport, String> {
    let text =
        fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    if let Ok(bundle) = serde_json::from_str::<ReportBundle<ProjectReport>>(&text) {
        return Ok(bundle.report);
    }
    serde_json::from_str(&text).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

fn emit(rendered: &str, output: Option<&Path>) -> Result<(), String> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
            }
            fs::write(path, rendered)
                .map_err(|e| format!("failed to write {}: {e}", path.display()))
        }
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
