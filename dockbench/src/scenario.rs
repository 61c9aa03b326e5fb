use chrono::{DateTime, Local};
use typed_builder::TypedBuilder;

use crate::aggregate::LatencySet;
use crate::coordinator::Benchmark;
use crate::error::{ReportError, RunError};
use crate::operation::Operation;
use crate::percentile::{PercentileSummary, Thresholds};
use crate::report::{ReportRow, Reporter};

/// A named benchmark: what to call, how to drive it and how to label its result row.
///
/// ```rust
/// use dockbench::{Benchmark, Operation, OperationError, Scenario, Termination};
/// use std::time::Duration;
///
/// struct Noop;
///
/// impl Operation for Noop {
///     async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
///         Ok(())
///     }
/// }
///
/// # async fn demo() -> Result<(), dockbench::RunError> {
/// let outcome = Scenario::builder()
///     .name("noop")
///     .operation(Noop)
///     .benchmark(
///         Benchmark::builder()
///             .workers(2)
///             .termination(Termination::Deadline(Duration::from_millis(10)))
///             .build(),
///     )
///     .labels(vec!["2".to_string()])
///     .build()
///     .run()
///     .await?;
/// assert!(!outcome.latencies.is_empty());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<O> {
    #[builder(setter(into))]
    pub name: String,
    pub operation: O,
    pub benchmark: Benchmark,
    /// Values for the caller's label columns, e.g. worker count and target rate.
    #[builder(default)]
    pub labels: Vec<String>,
}

/// What one scenario run produced, stamped with the wall-clock window it ran in.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub name: String,
    pub labels: Vec<String>,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
    pub latencies: LatencySet,
}

impl<O: Operation> Scenario<O> {
    pub async fn run(self) -> Result<Outcome, RunError> {
        tracing::info!("Running scenario {:?}...", self.name);
        let started = Local::now();
        let latencies = self.benchmark.run(self.operation).await?;
        let finished = Local::now();
        tracing::info!(
            "Scenario {:?} finished in {}ms.",
            self.name,
            (finished - started).num_milliseconds()
        );

        Ok(Outcome {
            name: self.name,
            labels: self.labels,
            started,
            finished,
            latencies,
        })
    }
}

impl Outcome {
    pub fn summary(&self, thresholds: &Thresholds) -> PercentileSummary {
        PercentileSummary::compute(&self.latencies, thresholds)
    }

    /// Reduce the latencies and hand the row to `reporter`.
    pub fn report<R: Reporter + ?Sized>(
        &self,
        reporter: &mut R,
        thresholds: &Thresholds,
    ) -> Result<PercentileSummary, ReportError> {
        let summary = self.summary(thresholds);
        reporter.result(&ReportRow {
            started: self.started,
            finished: self.finished,
            summary: &summary,
            labels: self.labels.clone(),
        })?;
        Ok(summary)
    }
}
