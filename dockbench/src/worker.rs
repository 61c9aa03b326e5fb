//! The worker loop: one sequential execution unit of a benchmark run.
//!
//! Each iteration
//! 1. takes one token from the shared [`RateLimiter`], when one is configured,
//! 2. captures a start timestamp, invokes the operation once and captures an end
//!    timestamp,
//! 3. records `end - start` (subject to the [`ErrorPolicy`] when the call failed),
//! 4. checks the [`Termination`] condition,
//! 5. sleeps the inter-call interval, unless it is zero or the loop is stopping.
//!
//! Termination and cancellation are only observed between iterations; an in-flight
//! call always completes and is always recorded.
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::aggregate::LatencySequence;
use crate::error::RunError;
use crate::limiter::RateLimiter;
use crate::metric::LatencySample;
use crate::operation::Operation;

/// When a worker loop stops. Exactly one mode governs a run.
#[derive(Clone, Debug)]
pub enum Termination {
    /// Stop once the time since the loop started reaches the test period.
    /// At least one call is always made, even for a zero period.
    Deadline(Duration),
    /// Stop once the token is cancelled, checked once per iteration.
    Signal(CancellationToken),
    /// Process each target exactly once, in order, then stop. No deadline applies.
    Targets(Vec<String>),
}

/// What a failed invocation does to the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop every worker and fail the run with the error.
    #[default]
    AbortRun,
    /// Drop the sample, count the failure and keep going.
    SkipSample,
    /// Keep the sample, count the failure and keep going.
    RecordAsFailure,
}

/// A single worker, owning everything one loop needs.
pub(crate) struct Worker<O> {
    pub index: usize,
    pub operation: Arc<O>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub interval: Duration,
    pub policy: ErrorPolicy,
    /// Run-scoped token a failing worker cancels to stop its siblings.
    pub abort: CancellationToken,
}

impl<O: Operation> Worker<O> {
    /// Run the loop until `termination` fires and return this worker's samples.
    pub async fn run(self, termination: Termination) -> Result<LatencySequence, RunError> {
        let mut latencies = LatencySequence::new();
        let mut targets = match &termination {
            Termination::Targets(targets) => Some(targets.iter()),
            _ => None,
        };
        let started = Instant::now();
        // Cancels the run unless this loop returns normally, so a panicking
        // operation stops the other workers too.
        let siblings = self.abort.clone().drop_guard();
        tracing::debug!("Worker {} started.", self.index);

        loop {
            let target = match targets.as_mut() {
                Some(remaining) => match remaining.next() {
                    Some(target) => Some(target.as_str()),
                    None => break,
                },
                None => None,
            };

            if let Some(limiter) = &self.limiter {
                limiter.acquire(1).await;
            }

            let start = Instant::now();
            let result = self.operation.invoke(target).await;
            let end = Instant::now();
            let sample = LatencySample::between(start, end);

            match result {
                Ok(()) => latencies.record(sample),
                Err(source) => match self.policy {
                    ErrorPolicy::AbortRun => {
                        tracing::error!("Worker {} aborting the run: {source}", self.index);
                        self.abort.cancel();
                        return Err(RunError::Operation {
                            worker: self.index,
                            source,
                        });
                    }
                    ErrorPolicy::SkipSample => {
                        tracing::warn!("Worker {} skipping failed call: {source}", self.index);
                        latencies.record_failure();
                    }
                    ErrorPolicy::RecordAsFailure => {
                        tracing::warn!("Worker {} recording failed call: {source}", self.index);
                        latencies.record(sample);
                        latencies.record_failure();
                    }
                },
            }

            let done = match &termination {
                Termination::Deadline(period) => started.elapsed() >= *period,
                Termination::Signal(token) => token.is_cancelled(),
                Termination::Targets(_) => targets.as_ref().is_some_and(|t| t.len() == 0),
            };
            if done || self.abort.is_cancelled() {
                break;
            }

            if !self.interval.is_zero() {
                tokio::time::sleep(self.interval).await;
            }
        }

        tracing::debug!(
            "Worker {} shutting down with {} samples.",
            self.index,
            latencies.len()
        );
        siblings.disarm();
        Ok(latencies)
    }
}
