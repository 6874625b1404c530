#![warn(missing_docs)]
//! SweepBench CLI Library
//!
//! Sweep planning, the sweep runner, execution harnesses and the command
//! line. Binaries link their codec crates and call [`run`]; the same binary
//! doubles as the isolated worker when started with `--sweep-worker`.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     sweepbench_codecs::link();
//!     sweepbench_cli::run()
//! }
//! ```

mod config;
mod harness;
mod planner;
mod runner;

pub use config::{
    AlgorithmOverride, CONFIG_FILE, ConfigError, IsolationMode, OutputConfig, RunnerConfig,
    SweepConfig, lib_sizes,
};
pub use harness::{
    Harness, HarnessError, HarnessFactory, InProcessHarness, InProcessHarnessFactory,
    ProcessHarnessFactory, WorkerProcess,
};
pub use planner::{
    AlgorithmConfig, BenchmarkTask, Capability, Direction, PlanSummary, ReferenceSpec,
    SourceBinding, SweepPlan, apply_filter, build_plan, default_algorithms,
};
pub use runner::{
    AllocationLog, AllocationResult, CancellationFlag, SweepAction, SweepData, SweepError,
    SweepInput, SweepResult, SweepRunner, SweepState, Termination, format_allocation_log,
    format_human_output, format_plan, format_registry, run_allocation,
};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sweepbench_core::{Registry, WorkerMain};
use sweepbench_report::{ExportFormat, OutputFormat, SelectionStore, export, export_file_name};
use tracing_subscriber::EnvFilter;

/// SweepBench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "sweepbench")]
#[command(
    author,
    version,
    about = "SweepBench - compression and allocation sweeps over your own input"
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Internal: Run as worker process (used by the process harness)
    #[arg(long, hide = true)]
    pub sweep_worker: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a sweep over an input file
    Run(RunArgs),
    /// Print the sweep plan without executing it
    Plan(SelectionArgs),
    /// List registered codecs and allocators
    List,
    /// Run allocation workloads
    Alloc(AllocArgs),
}

/// Which algorithms to sweep, and how often
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Iterations per level (overrides sweep.toml)
    #[arg(short = 'n', long)]
    pub iterations: Option<u32>,

    /// Only sweep algorithms whose id matches this regex
    #[arg(long)]
    pub filter: Option<String>,

    /// Enable an algorithm disabled by default or in sweep.toml
    #[arg(long)]
    pub enable: Vec<String>,

    /// Disable an algorithm
    #[arg(long)]
    pub disable: Vec<String>,
}

/// Arguments for `sweepbench run`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Input file to sweep
    #[arg(name = "FILE")]
    pub file: PathBuf,

    /// Algorithm selection
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Output format: human, json, csv
    #[arg(long)]
    pub format: Option<String>,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Also write an export file (json or csv) into the output directory
    #[arg(long)]
    pub export: Option<String>,

    /// Run timed operations in an isolated worker process
    /// Use --isolated=false to run them on a thread in this process
    #[arg(long, action = clap::ArgAction::Set)]
    pub isolated: Option<bool>,

    /// Per-call worker timeout in seconds
    #[arg(long)]
    pub worker_timeout: Option<u64>,

    /// Highlight one algorithm in the table and chart summary
    #[arg(long)]
    pub highlight: Option<String>,
}

/// Arguments for `sweepbench alloc`
#[derive(Args, Debug, Clone)]
pub struct AllocArgs {
    /// Corpus string copied by the workload
    #[arg(long, default_value = "helloworld")]
    pub text: String,

    /// Workload iterations
    #[arg(long, default_value = "100000")]
    pub iterations: u32,

    /// Allocators to run (default: all registered)
    #[arg(long)]
    pub allocator: Vec<String>,

    /// Runs per allocator
    #[arg(long, default_value = "1")]
    pub repeat: u32,

    /// Run in an isolated worker process
    #[arg(long, action = clap::ArgAction::Set)]
    pub isolated: Option<bool>,
}

/// Run the SweepBench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if something goes wrong.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the SweepBench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // stdout belongs to the IPC channel in worker mode
    init_logging(cli.verbose);

    if cli.sweep_worker {
        return run_worker_mode();
    }

    let config = SweepConfig::discover()?.unwrap_or_default();

    let Some(command) = cli.command else {
        anyhow::bail!("No command given; try `sweepbench --help`");
    };

    match command {
        Commands::List => {
            print!("{}", format_registry(&Registry::discover()));
            Ok(())
        }
        Commands::Plan(selection) => plan_sweep(&selection, &config),
        Commands::Run(args) => block_on(run_sweep(args, config)),
        Commands::Alloc(args) => block_on(run_alloc(args, config)),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "sweepbench=debug"
    } else {
        "sweepbench=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run as a worker process (IPC mode)
fn run_worker_mode() -> anyhow::Result<()> {
    let mut worker = WorkerMain::stdio(Registry::discover());
    worker
        .run()
        .map_err(|e| anyhow::anyhow!("Worker error: {}", e))
}

fn block_on<F: std::future::Future<Output = anyhow::Result<()>>>(
    future: F,
) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(future)
}

/// Registry defaults, then sweep.toml, then CLI flags.
fn resolve_algorithms(
    registry: &Registry,
    config: &SweepConfig,
    selection: &SelectionArgs,
) -> anyhow::Result<Vec<AlgorithmConfig>> {
    let mut algorithms = default_algorithms(registry);
    config.apply_to(&mut algorithms)?;

    for (ids, enabled) in [(&selection.enable, true), (&selection.disable, false)] {
        for id in ids {
            let algorithm = algorithms
                .iter_mut()
                .find(|a| &a.id == id)
                .with_context(|| format!("Unknown algorithm '{}'", id))?;
            algorithm.enabled = enabled;
        }
    }

    if let Some(pattern) = &selection.filter {
        let filter =
            Regex::new(pattern).with_context(|| format!("Invalid filter regex '{}'", pattern))?;
        apply_filter(&mut algorithms, &filter);
    }

    Ok(algorithms)
}

fn resolve_iterations(selection: &SelectionArgs, config: &SweepConfig) -> anyhow::Result<u32> {
    let iterations = selection.iterations.unwrap_or(config.runner.iterations);
    if iterations == 0 {
        anyhow::bail!("Iterations must be at least 1");
    }
    Ok(iterations)
}

fn harness_factory(
    isolated: Option<bool>,
    timeout: Option<u64>,
    config: &SweepConfig,
    registry: Registry,
) -> anyhow::Result<Arc<dyn HarnessFactory>> {
    let isolated = isolated.unwrap_or(config.runner.isolation.is_isolated());
    if !isolated {
        tracing::debug!("running timed operations in-process");
        return Ok(Arc::new(InProcessHarnessFactory::new(registry)));
    }

    let timeout = match timeout {
        Some(secs) => Duration::from_secs(secs),
        None => config.worker_timeout()?,
    };
    Ok(Arc::new(ProcessHarnessFactory::new(timeout)))
}

fn plan_sweep(selection: &SelectionArgs, config: &SweepConfig) -> anyhow::Result<()> {
    let registry = Registry::discover();
    let algorithms = resolve_algorithms(&registry, config, selection)?;
    let iterations = resolve_iterations(selection, config)?;

    print!("{}", format_plan(&build_plan(&algorithms, iterations).summary()));
    Ok(())
}

async fn run_sweep(args: RunArgs, config: SweepConfig) -> anyhow::Result<()> {
    let registry = Registry::discover();
    let algorithms = resolve_algorithms(&registry, &config, &args.selection)?;
    let iterations = resolve_iterations(&args.selection, &config)?;

    let format_name = args.format.as_deref().unwrap_or(&config.output.format);
    let format: OutputFormat = format_name.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let export_format = args
        .export
        .as_deref()
        .map(|s| s.parse::<ExportFormat>())
        .transpose()
        .map_err(|e| anyhow::anyhow!(e))?;

    let input = SweepInput::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let factory = harness_factory(args.isolated, args.worker_timeout, &config, registry)?;

    let total_tasks = build_plan(&algorithms, iterations).tasks.len();
    tracing::info!(
        "sweeping {} ({} bytes): {} tasks",
        input.filename,
        input.bytes.len(),
        total_tasks
    );

    let runner = SweepRunner::new(factory, iterations);

    let cancel = runner.cancellation();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current task");
            cancel.cancel();
        }
    });

    let pb = ProgressBar::new(total_tasks as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("Starting execution context...");

    let mut snapshots = runner.subscribe();
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let state = Arc::clone(&snapshots.borrow_and_update());
                if let Some(data) = state.data() {
                    pb.set_position(data.samples.len() as u64);
                    if let Some(status) = &data.status {
                        pb.set_message(status.clone());
                    }
                }
                if state.termination().is_some() {
                    break;
                }
            }
        })
    };

    let outcome = runner.run(&input, &algorithms).await;
    ctrl_c.abort();
    progress.abort();
    pb.finish_and_clear();
    let result = outcome?;

    let store = SelectionStore::global();
    if let Some(id) = &args.highlight {
        store.set_active([id.as_str()]);
    }

    let data = &result.data;
    let output = match format.export_format() {
        None => format_human_output(&result, &lib_sizes(&algorithms), store),
        Some(format) => export(
            format,
            &data.filename,
            data.total_bytes,
            &data.samples,
            chrono::Utc::now(),
        )?,
    };

    if let Some(ref path) = args.output {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        file.write_all(output.as_bytes())?;
        eprintln!("Results written to {}", path.display());
    } else {
        print!("{}", output);
    }

    if let Some(format) = export_format {
        let directory = PathBuf::from(&config.output.directory);
        std::fs::create_dir_all(&directory)
            .with_context(|| format!("Failed to create {}", directory.display()))?;
        let path = directory.join(export_file_name(
            &data.filename,
            format,
            chrono::Local::now().date_naive(),
        ));
        let contents = export(
            format,
            &data.filename,
            data.total_bytes,
            &data.samples,
            chrono::Utc::now(),
        )?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Exported to {}", path.display());
    }

    match result.termination {
        Termination::Failed { error } => Err(anyhow::anyhow!("Sweep failed: {}", error)),
        Termination::Cancelled | Termination::Completed => Ok(()),
    }
}

async fn run_alloc(args: AllocArgs, config: SweepConfig) -> anyhow::Result<()> {
    let registry = Registry::discover();
    let allocators = if args.allocator.is_empty() {
        registry.allocator_ids()
    } else {
        for id in &args.allocator {
            if registry.allocator(id).is_none() {
                anyhow::bail!("Unknown allocator '{}'", id);
            }
        }
        args.allocator.clone()
    };

    let factory = harness_factory(args.isolated, None, &config, registry)?;
    let mut log = AllocationLog::new();

    for _ in 0..args.repeat {
        for allocator in &allocators {
            let result = run_allocation(factory.as_ref(), allocator, &args.text, args.iterations)
                .await
                .with_context(|| format!("Allocation run '{}' failed", allocator))?;
            log.push(result);
        }
    }

    println!("Allocation results (newest first):");
    print!("{}", format_allocation_log(&log));
    Ok(())
}
