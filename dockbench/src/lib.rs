//! Dockbench: a concurrent latency benchmark engine for container runtime APIs.
//!
//! The engine drives a fixed pool of workers, each repeatedly invoking one
//! [`Operation`] (list, inspect, create+start, stop+remove, or anything else you
//! implement) and timing every call. Workers share one optional [`RateLimiter`] and stop
//! on a deadline, a cancellation signal or the exhaustion of a pre-assigned target
//! list. Their samples are merged into a [`LatencySet`] and reduced to tail-average
//! percentiles, which a [`Reporter`] prints.
//!
//! # Architecture
//!
//! - [`Operation`]: one timed unit of work. Fallible; what a failure does to the run is
//!   the [`ErrorPolicy`] of the [`Benchmark`].
//! - [`Benchmark`]: the coordinator. Validates the configuration, spawns the workers,
//!   waits for all of them and concatenates their [`LatencySequence`]s.
//! - [`RateLimiter`]: token bucket shared by all workers of one run.
//! - [`PercentileSummary`]: mean of the slowest samples per [`Thresholds`] rate,
//!   in milliseconds.
//! - [`Reporter`]: turns summaries into a table or JSON lines.
//! - [`Scenario`]: glue that names a run and labels its row.
//! - [`runtime`]: the container runtime seam, with an in-memory [`SimulatedRuntime`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use dockbench::{
//!     Benchmark, PercentileSummary, Scenario, SimulatedRuntime, Termination,
//!     operation::ListContainers,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = Arc::new(SimulatedRuntime::new(Duration::from_millis(1)));
//!     let outcome = Scenario::builder()
//!         .name("list")
//!         .operation(ListContainers::new(runtime, true))
//!         .benchmark(
//!             Benchmark::builder()
//!                 .workers(4)
//!                 .rate(200.0)
//!                 .termination(Termination::Deadline(Duration::from_millis(100)))
//!                 .build(),
//!         )
//!         .build()
//!         .run()
//!         .await
//!         .unwrap();
//!
//!     let summary = PercentileSummary::from(&outcome.latencies);
//!     assert!(summary.samples > 0);
//! }
//! ```

/// Per-worker and combined latency collections
pub mod aggregate;
/// Fan-out of workers and fan-in of their results
pub mod coordinator;
pub mod error;
/// Shared token bucket
pub mod limiter;
/// Single latency samples
pub mod metric;
/// Benchmarked operations
pub mod operation;
/// Tail-average percentile reduction
pub mod percentile;
/// Reports and Reporters
pub mod report;
/// Container runtime seam
pub mod runtime;
/// Named, labelled benchmark runs
pub mod scenario;
/// The worker loop
pub mod worker;

pub use aggregate::{LatencySequence, LatencySet};
pub use coordinator::{Benchmark, partition};
pub use error::{ConfigError, OperationError, ReportError, RunError, RuntimeError};
pub use limiter::RateLimiter;
pub use metric::LatencySample;
pub use operation::Operation;
pub use percentile::{PercentileSummary, Thresholds};
pub use report::{JsonReporter, Reporter, TableReporter};
pub use runtime::{ContainerRuntime, SimulatedRuntime};
pub use scenario::{Outcome, Scenario};
pub use worker::{ErrorPolicy, Termination};
