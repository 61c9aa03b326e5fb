//! Dockbench CLI - latency benchmark suites against a container runtime.
//!
//! ## Commands
//!
//! - `dockbench list` - list containers, with dead and/or alive containers present
//! - `dockbench inspect` - inspect random containers out of a pool of alive ones
//! - `dockbench lifecycle` - create+start for the period, then stop+remove every container
//!
//! Every suite sweeps over `--workers` and prints one result row per worker count.
//! Logs go to stderr (`RUST_LOG`, default `info`); stdout carries only the results.

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use dockbench::operation::{InspectContainer, ListContainers, StartContainer, StopContainer};
use dockbench::runtime::{
    container_ids, create_alive_containers, create_dead_containers, remove_all_containers,
};
use dockbench::{
    Benchmark, ErrorPolicy, JsonReporter, Operation, Reporter, Scenario, SimulatedRuntime,
    TableReporter, Termination, Thresholds,
};

#[derive(Parser)]
#[command(name = "dockbench", about = "Container runtime latency benchmarks")]
#[command(version)]
struct Cli {
    /// Worker counts to sweep, e.g. `1,4,16` (default: number of CPUs)
    #[arg(long, global = true, value_delimiter = ',')]
    workers: Vec<usize>,

    /// Aggregate operations per second across all workers (0 = unlimited)
    #[arg(long, global = true, default_value_t = 0.0)]
    qps: f64,

    /// Rate limiter burst (default: worker count)
    #[arg(long, global = true)]
    burst: Option<u64>,

    /// Test period in seconds
    #[arg(long, global = true, default_value_t = 10)]
    period: u64,

    /// Pause between two calls of one worker, in milliseconds
    #[arg(long, global = true, default_value_t = 0)]
    interval_ms: u64,

    /// Run until Ctrl-C instead of for the test period
    #[arg(long, global = true)]
    until_interrupted: bool,

    /// What a failed call does to the run
    #[arg(long, global = true, value_enum, default_value_t = OnError::Abort)]
    on_error: OnError,

    /// Per-call latency of the simulated runtime, in milliseconds
    #[arg(long, global = true, default_value_t = 1)]
    latency_ms: u64,

    /// Container stop timeout, in seconds
    #[arg(long, global = true, default_value_t = 10)]
    stop_timeout: u64,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = Format::Table)]
    format: Format,

    #[command(subcommand)]
    command: Suite,
}

#[derive(Subcommand)]
enum Suite {
    /// Benchmark listing containers
    List {
        /// Stopped containers to create first
        #[arg(long, default_value_t = 0)]
        dead: usize,

        /// Running containers to create first
        #[arg(long, default_value_t = 0)]
        alive: usize,

        /// List stopped containers too
        #[arg(long)]
        all: bool,
    },

    /// Benchmark inspecting random running containers
    Inspect {
        /// Running containers to create first
        #[arg(long, default_value_t = 50)]
        containers: usize,
    },

    /// Benchmark create+start, then stop+remove of every created container
    Lifecycle,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Table,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnError {
    Abort,
    Skip,
    Record,
}

impl From<OnError> for ErrorPolicy {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Abort => ErrorPolicy::AbortRun,
            OnError::Skip => ErrorPolicy::SkipSample,
            OnError::Record => ErrorPolicy::RecordAsFailure,
        }
    }
}

impl Cli {
    fn worker_sweep(&self) -> Vec<usize> {
        if self.workers.is_empty() {
            vec![num_cpus::get()]
        } else {
            self.workers.clone()
        }
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout)
    }

    /// Deadline or signal termination for the open-ended suites.
    fn termination(&self) -> (Termination, Option<CancellationToken>) {
        if self.until_interrupted {
            let token = CancellationToken::new();
            (Termination::Signal(token.clone()), Some(token))
        } else {
            (Termination::Deadline(self.period()), None)
        }
    }

    fn benchmark(&self, workers: usize, termination: Termination) -> Benchmark {
        Benchmark {
            workers,
            rate: self.qps,
            burst: self.burst,
            interval: Duration::from_millis(self.interval_ms),
            termination,
            on_operation_error: self.on_error.into(),
        }
    }

    fn environment(&self) -> Vec<(&'static str, String)> {
        vec![
            ("qps", self.qps.to_string()),
            ("period", format!("{}s", self.period)),
            ("interval", format!("{}ms", self.interval_ms)),
            ("latency", format!("{}ms", self.latency_ms)),
            ("on_error", format!("{:?}", self.on_error).to_lowercase()),
            ("until_interrupted", self.until_interrupted.to_string()),
        ]
    }
}

/// Cancel `token` on the first Ctrl-C. Abort the handle to stop listening.
fn cancel_on_interrupt(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping workers...");
            token.cancel();
        }
    })
}

/// Run one scenario and print its row.
async fn run_one<O: Operation>(
    cli: &Cli,
    reporter: &mut dyn Reporter,
    thresholds: &Thresholds,
    name: &str,
    operation: O,
    benchmark: Benchmark,
    signal: Option<CancellationToken>,
) -> anyhow::Result<()> {
    let labels = vec![benchmark.workers.to_string(), format!("{:.4}", cli.qps)];
    let listener = signal.map(cancel_on_interrupt);

    let outcome = Scenario::builder()
        .name(name)
        .operation(operation)
        .benchmark(benchmark)
        .labels(labels)
        .build()
        .run()
        .await;
    if let Some(listener) = listener {
        listener.abort();
    }

    let outcome = outcome.with_context(|| format!("{name} benchmark failed"))?;
    let summary = outcome.report(reporter, thresholds)?;
    if summary.failures > 0 {
        tracing::warn!("{} calls failed during {name}.", summary.failures);
    }
    Ok(())
}

async fn list_suite(
    cli: &Cli,
    runtime: &Arc<SimulatedRuntime>,
    reporter: &mut dyn Reporter,
    thresholds: &Thresholds,
    dead: usize,
    alive: usize,
    all: bool,
) -> anyhow::Result<()> {
    create_dead_containers(runtime.as_ref(), dead)
        .await
        .context("creating dead containers")?;
    create_alive_containers(runtime.as_ref(), alive)
        .await
        .context("creating alive containers")?;

    reporter.title(&format!(
        "Benchmark: list {} containers with {dead} dead and {alive} alive",
        if all { "all" } else { "running" }
    ))?;
    reporter.environment(&cli.environment())?;
    reporter.labels(&["#workers", "qps"])?;

    for workers in cli.worker_sweep() {
        let (termination, signal) = cli.termination();
        let operation = ListContainers::new(runtime.clone(), all);
        let benchmark = cli.benchmark(workers, termination);
        run_one(cli, reporter, thresholds, "list", operation, benchmark, signal).await?;
    }
    Ok(())
}

async fn inspect_suite(
    cli: &Cli,
    runtime: &Arc<SimulatedRuntime>,
    reporter: &mut dyn Reporter,
    thresholds: &Thresholds,
    containers: usize,
) -> anyhow::Result<()> {
    let ids = create_alive_containers(runtime.as_ref(), containers)
        .await
        .context("creating alive containers")?;

    reporter.title(&format!(
        "Benchmark: inspect random containers out of {containers} alive"
    ))?;
    reporter.environment(&cli.environment())?;
    reporter.labels(&["#workers", "qps"])?;

    for workers in cli.worker_sweep() {
        let (termination, signal) = cli.termination();
        let operation = InspectContainer::new(runtime.clone(), ids.clone());
        let benchmark = cli.benchmark(workers, termination);
        run_one(cli, reporter, thresholds, "inspect", operation, benchmark, signal).await?;
    }
    Ok(())
}

async fn lifecycle_suite(
    cli: &Cli,
    runtime: &Arc<SimulatedRuntime>,
    reporter: &mut dyn Reporter,
    thresholds: &Thresholds,
) -> anyhow::Result<()> {
    reporter.title("Benchmark: container lifecycle")?;
    reporter.environment(&cli.environment())?;
    reporter.labels(&["#workers", "qps"])?;

    for workers in cli.worker_sweep() {
        let operation = StartContainer::new(runtime.clone());
        let benchmark = cli.benchmark(workers, Termination::Deadline(cli.period()));
        run_one(cli, reporter, thresholds, "start", operation, benchmark, None).await?;

        let ids = container_ids(runtime.as_ref())
            .await
            .context("listing created containers")?;
        if ids.is_empty() {
            tracing::warn!("No containers were started, skipping the stop benchmark.");
            continue;
        }
        let operation = StopContainer::new(runtime.clone(), cli.stop_timeout());
        let benchmark = cli.benchmark(workers, Termination::Targets(ids));
        run_one(cli, reporter, thresholds, "stop", operation, benchmark, None).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let runtime = Arc::new(SimulatedRuntime::new(Duration::from_millis(cli.latency_ms)));
    let thresholds = Thresholds::default();
    let stdout = io::stdout().lock();
    let mut reporter: Box<dyn Reporter> = match cli.format {
        Format::Table => Box::new(TableReporter::new(stdout, thresholds.clone())),
        Format::Json => Box::new(JsonReporter::new(stdout)),
    };

    tracing::info!("Benchmark started at {}.", Local::now().format("%d:%H:%M:%S"));
    let result = match &cli.command {
        Suite::List { dead, alive, all } => {
            list_suite(&cli, &runtime, reporter.as_mut(), &thresholds, *dead, *alive, *all).await
        }
        Suite::Inspect { containers } => {
            inspect_suite(&cli, &runtime, reporter.as_mut(), &thresholds, *containers).await
        }
        Suite::Lifecycle => {
            lifecycle_suite(&cli, &runtime, reporter.as_mut(), &thresholds).await
        }
    };

    let removed = remove_all_containers(runtime.as_ref(), cli.stop_timeout())
        .await
        .context("removing benchmark containers")?;
    tracing::info!("Removed {removed} containers.");
    drop(reporter);
    io::stdout().flush()?;

    result
}
