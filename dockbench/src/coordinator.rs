//! Coordinator — fan-out of worker loops and fan-in of their latencies.
//!
//! A [`Benchmark`] describes one run: how many workers, the aggregate rate budget,
//! the inter-call interval, how the workers terminate and what a failed call does.
//! [`Benchmark::run`] then
//! 1. validates the configuration, launching nothing if it is invalid,
//! 2. builds one [`RateLimiter`] shared by all workers when a rate is set,
//! 3. splits a finite target list round-robin into one disjoint sublist per worker,
//!    or hands every worker the same deadline or stop signal,
//! 4. spawns exactly `workers` Tokio tasks and waits for all of them,
//! 5. concatenates their sequences in worker-index order into a [`LatencySet`].
//!
//! No percentile computation happens here.
//!
//! # Failures
//! Under [`ErrorPolicy::AbortRun`] the first failing worker cancels a token scoped to
//! this run. The other workers stop at their next iteration boundary, and the run
//! returns that worker's error without salvaging partial results. A panicking worker
//! cancels the same token and fails the run as well.
//!
//! Workers belong to the [`Benchmark::run`] future: dropping it (for example under a
//! caller's timeout) aborts every worker task still running.
//!
//! # Tuning knobs
//! - `rate` (f64): aggregate calls per second across all workers. `0` disables limiting.
//! - `burst` (u64): tokens available instantly. Defaults to the worker count, so every
//!   worker can start without waiting on the others.
//! - `interval` (Duration): pause between calls of one worker.
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::AbortOnDropHandle;
use typed_builder::TypedBuilder;

use crate::aggregate::{LatencySequence, LatencySet};
use crate::error::{ConfigError, RunError};
use crate::limiter::RateLimiter;
use crate::operation::Operation;
use crate::worker::{ErrorPolicy, Termination, Worker};

/// Configuration of a single benchmark run.
///
/// ```rust
/// use dockbench::{Benchmark, Termination};
/// use std::time::Duration;
///
/// let benchmark = Benchmark::builder()
///     .workers(4)
///     .rate(100.0)
///     .termination(Termination::Deadline(Duration::from_secs(2)))
///     .build();
/// assert!(benchmark.validate().is_ok());
/// ```
#[derive(Clone, Debug, TypedBuilder)]
pub struct Benchmark {
    /// Number of concurrent worker loops.
    pub workers: usize,
    /// Aggregate operations per second. Zero disables rate limiting.
    #[builder(default)]
    pub rate: f64,
    /// Rate limiter burst capacity; the worker count when unset.
    #[builder(default, setter(strip_option))]
    pub burst: Option<u64>,
    /// Pause between two calls of the same worker.
    #[builder(default)]
    pub interval: Duration,
    /// When the workers stop.
    pub termination: Termination,
    /// What a failed invocation does to the run.
    #[builder(default)]
    pub on_operation_error: ErrorPolicy,
}

impl Benchmark {
    /// Check the configuration without starting anything.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(ConfigError::InvalidRate(self.rate));
        }
        if self.burst == Some(0) {
            return Err(ConfigError::NoBurst);
        }
        if let Termination::Targets(targets) = &self.termination {
            if targets.is_empty() {
                return Err(ConfigError::NoTargets);
            }
        }
        Ok(())
    }

    /// The shared limiter for this run, if a rate is configured.
    fn limiter(&self) -> Option<Arc<RateLimiter>> {
        (self.rate > 0.0).then(|| {
            let burst = self.burst.unwrap_or(self.workers as u64);
            Arc::new(RateLimiter::new(self.rate, burst))
        })
    }

    /// One termination condition per worker.
    fn assignments(&self) -> Vec<Termination> {
        match &self.termination {
            Termination::Targets(targets) => partition(targets, self.workers)
                .into_iter()
                .map(Termination::Targets)
                .collect(),
            shared => vec![shared.clone(); self.workers],
        }
    }

    /// Run `operation` on every worker and return the combined latencies.
    pub async fn run<O: Operation>(&self, operation: O) -> Result<LatencySet, RunError> {
        self.validate()?;

        let operation = Arc::new(operation);
        let limiter = self.limiter();
        let abort = CancellationToken::new();

        match &limiter {
            Some(l) => tracing::info!(
                "Spawning {} workers at {} ops/s (burst {})...",
                self.workers,
                l.rate(),
                l.capacity()
            ),
            None => tracing::info!("Spawning {} workers without rate limit...", self.workers),
        }
        let handles: Vec<_> = self
            .assignments()
            .into_iter()
            .enumerate()
            .map(|(index, termination)| {
                let worker = Worker {
                    index,
                    operation: operation.clone(),
                    limiter: limiter.clone(),
                    interval: self.interval,
                    policy: self.on_operation_error,
                    abort: abort.clone(),
                };
                AbortOnDropHandle::new(tokio::spawn(worker.run(termination)))
            })
            .collect();

        tracing::info!("Waiting for workers to finish...");
        let mut sequences: Vec<LatencySequence> = Vec::with_capacity(handles.len());
        let mut failure = None;
        for (index, res) in join_all(handles).await.into_iter().enumerate() {
            match res {
                Ok(Ok(sequence)) => sequences.push(sequence),
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(e) => {
                    tracing::error!("Worker {index} panicked with error: {e}");
                    failure.get_or_insert(RunError::WorkerPanicked {
                        worker: index,
                        message: e.to_string(),
                    });
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        let set = LatencySet::from_sequences(sequences);
        tracing::info!(
            "Run finished with {} samples and {} failed calls.",
            set.len(),
            set.failures()
        );
        Ok(set)
    }
}

/// Split `targets` into `n` disjoint sublists, assigning item `i` to sublist `i % n`.
///
/// Sublist sizes differ by at most one; with more sublists than targets the extra
/// ones are empty.
pub fn partition(targets: &[String], n: usize) -> Vec<Vec<String>> {
    let mut parts = vec![Vec::new(); n];
    if n == 0 {
        return parts;
    }
    for (i, target) in targets.iter().enumerate() {
        parts[i % n].push(target.clone());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Fixed {
        latency: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl Fixed {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Operation for Arc<Fixed> {
        async fn invoke(&self, target: Option<&str>) -> Result<(), OperationError> {
            if let Some(target) = target {
                self.seen.lock().unwrap().push(target.to_string());
            }
            tokio::time::sleep(self.latency).await;
            Ok(())
        }
    }

    /// Fails once the shared call counter reaches `fail_at`.
    struct FailAt {
        calls: AtomicU64,
        fail_at: u64,
    }

    impl Operation for FailAt {
        async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
            tokio::time::sleep(Duration::from_millis(1)).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_at {
                return Err(OperationError::Failed("backend said no".to_string()));
            }
            Ok(())
        }
    }

    /// Counts every call and panics on the `panic_at`-th one, if set.
    struct Counting {
        calls: AtomicU64,
        latency: Duration,
        panic_at: Option<u64>,
    }

    impl Counting {
        fn new(latency: Duration, panic_at: Option<u64>) -> Self {
            Self {
                calls: AtomicU64::new(0),
                latency,
                panic_at,
            }
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Operation for Arc<Counting> {
        async fn invoke(&self, _target: Option<&str>) -> Result<(), OperationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(self.latency).await;
            if self.panic_at == Some(call) {
                panic!("call {call} blew up");
            }
            Ok(())
        }
    }

    struct Panics;

    impl Operation for Panics {
        async fn invoke(&self, target: Option<&str>) -> Result<(), OperationError> {
            if target == Some("boom") {
                panic!("boom");
            }
            Ok(())
        }
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("container-{i}")).collect()
    }

    #[test]
    fn partition_is_balanced_round_robin() {
        let parts = partition(&ids(10), 3);
        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(parts[1], vec!["container-1", "container-4", "container-7"]);
    }

    #[test]
    fn partition_is_a_set_partition() {
        for (len, n) in [(0, 3), (1, 4), (7, 7), (100, 8), (13, 1)] {
            let targets = ids(len);
            let parts = partition(&targets, n);
            assert_eq!(parts.len(), n);

            let flat: Vec<&String> = parts.iter().flatten().collect();
            let unique: HashSet<&String> = flat.iter().copied().collect();
            assert_eq!(flat.len(), len);
            assert_eq!(unique.len(), len);

            let max = parts.iter().map(Vec::len).max().unwrap_or(0);
            let min = parts.iter().map(Vec::len).min().unwrap_or(0);
            assert!(max - min <= 1);
        }
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let deadline = || Termination::Deadline(Duration::from_secs(1));

        let no_workers = Benchmark::builder().workers(0).termination(deadline()).build();
        assert_eq!(no_workers.validate(), Err(ConfigError::NoWorkers));

        let negative_rate = Benchmark::builder()
            .workers(1)
            .rate(-1.0)
            .termination(deadline())
            .build();
        assert_eq!(negative_rate.validate(), Err(ConfigError::InvalidRate(-1.0)));

        let no_burst = Benchmark::builder()
            .workers(1)
            .rate(5.0)
            .burst(0)
            .termination(deadline())
            .build();
        assert_eq!(no_burst.validate(), Err(ConfigError::NoBurst));

        let no_targets = Benchmark::builder()
            .workers(2)
            .termination(Termination::Targets(vec![]))
            .build();
        assert_eq!(no_targets.validate(), Err(ConfigError::NoTargets));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_configuration_launches_nothing() {
        let op = Arc::new(Fixed::new(Duration::from_millis(1)));
        let benchmark = Benchmark::builder()
            .workers(0)
            .termination(Termination::Targets(ids(3)))
            .build();

        let err = benchmark.run(op.clone()).await.unwrap_err();

        assert!(matches!(err, RunError::Config(ConfigError::NoWorkers)));
        assert!(op.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn targets_are_each_processed_exactly_once() {
        let op = Arc::new(Fixed::new(Duration::from_millis(3)));
        let targets = ids(23);
        let benchmark = Benchmark::builder()
            .workers(4)
            .termination(Termination::Targets(targets.clone()))
            .build();

        let set = benchmark.run(op.clone()).await.unwrap();

        assert_eq!(set.len(), targets.len());
        assert_eq!(set.workers(), 4);
        let mut seen = op.seen.lock().unwrap().clone();
        seen.sort();
        let mut expected = targets;
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn more_workers_than_targets() {
        let op = Arc::new(Fixed::new(Duration::from_millis(1)));
        let benchmark = Benchmark::builder()
            .workers(8)
            .termination(Termination::Targets(ids(3)))
            .build();

        let set = benchmark.run(op).await.unwrap();

        assert_eq!(set.len(), 3);
        assert_eq!(set.workers(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_deadline_run() {
        let op = Arc::new(Fixed::new(Duration::from_millis(5)));
        let benchmark = Benchmark::builder()
            .workers(4)
            .rate(100.0)
            .termination(Termination::Deadline(Duration::from_secs(2)))
            .build();

        let set = benchmark.run(op).await.unwrap();

        // 100 ops/s for 2s plus a burst of 4, plus at most one late call per worker
        assert!((195..=210).contains(&set.len()), "{} samples", set.len());
        assert!(set.samples().iter().all(|s| s.as_nanos() == 5_000_000));
    }

    #[tokio::test(start_paused = true)]
    async fn signal_stops_every_worker() {
        let op = Arc::new(Fixed::new(Duration::from_millis(10)));
        let token = CancellationToken::new();
        let benchmark = Benchmark::builder()
            .workers(3)
            .termination(Termination::Signal(token.clone()))
            .build();

        let run = tokio::spawn(async move { benchmark.run(op).await });
        tokio::time::sleep(Duration::from_millis(95)).await;
        token.cancel();
        let set = run.await.unwrap().unwrap();

        assert_eq!(set.len(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_policy_fails_the_whole_run() {
        let benchmark = Benchmark::builder()
            .workers(4)
            .termination(Termination::Deadline(Duration::from_secs(60)))
            .build();
        let op = FailAt {
            calls: AtomicU64::new(0),
            fail_at: 10,
        };

        let started = tokio::time::Instant::now();
        let err = benchmark.run(op).await.unwrap_err();

        assert!(matches!(err, RunError::Operation { .. }));
        // siblings stopped long before the deadline
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn skip_policy_keeps_running() {
        let benchmark = Benchmark::builder()
            .workers(2)
            .termination(Termination::Targets(ids(10)))
            .on_operation_error(ErrorPolicy::SkipSample)
            .build();
        let op = FailAt {
            calls: AtomicU64::new(0),
            fail_at: 4,
        };

        let set = benchmark.run(op).await.unwrap();

        assert_eq!(set.len(), 9);
        assert_eq!(set.failures(), 1);
    }

    #[tokio::test]
    async fn panicking_worker_fails_the_run() {
        let benchmark = Benchmark::builder()
            .workers(2)
            .termination(Termination::Targets(vec!["fine".to_string(), "boom".to_string()]))
            .build();

        let err = benchmark.run(Panics).await.unwrap_err();

        assert!(matches!(err, RunError::WorkerPanicked { worker: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_worker_stops_its_siblings() {
        let op = Arc::new(Counting::new(Duration::from_millis(1), Some(6)));
        let benchmark = Benchmark::builder()
            .workers(4)
            .termination(Termination::Deadline(Duration::from_secs(60)))
            .build();

        let started = tokio::time::Instant::now();
        let err = benchmark.run(op.clone()).await.unwrap_err();

        assert!(matches!(err, RunError::WorkerPanicked { .. }));
        // the others stop at their next iteration boundary, not at the deadline
        assert!(started.elapsed() < Duration::from_secs(1), "{:?}", started.elapsed());
        assert!(op.calls() <= 12, "{} calls", op.calls());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_run_stops_its_workers() {
        let op = Arc::new(Counting::new(Duration::from_millis(10), None));
        let benchmark = Benchmark::builder()
            .workers(2)
            .termination(Termination::Deadline(Duration::from_secs(10)))
            .build();

        let res = tokio::time::timeout(Duration::from_millis(50), benchmark.run(op.clone())).await;
        assert!(res.is_err());
        let at_drop = op.calls();

        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(op.calls(), at_drop);
    }
}
