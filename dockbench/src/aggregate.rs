use serde::{Deserialize, Serialize};

use crate::metric::LatencySample;

/// The samples recorded by a single worker, in the order its calls completed.
///
/// A sequence is private to the worker that owns it until the coordinator joins all
/// workers, so recording needs no synchronisation. Failed invocations that were not
/// recorded as samples are still counted in `failures`.
///
/// **Important:** like every aggregate in this crate, a sequence stores raw data only.
/// Tail averages and other derived statistics belong to
/// [`crate::percentile::PercentileSummary`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySequence {
    samples: Vec<LatencySample>,
    failures: u64,
}

impl LatencySequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    pub fn record(&mut self, sample: LatencySample) {
        self.samples.push(sample);
    }

    /// Count a failed invocation.
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Append every sample of `other` after the ones already held.
    pub fn merge(&mut self, other: Self) {
        self.samples.extend(other.samples);
        self.failures += other.failures;
    }

    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The Combined Latency Set: every worker's sequence concatenated in worker-index order.
///
/// Built once by the coordinator after all workers have returned and read-only
/// afterwards. Its length is always the sum of the lengths of the joined sequences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencySet {
    samples: Vec<LatencySample>,
    failures: u64,
    workers: usize,
}

impl LatencySet {
    /// Flatten `sequences` in iteration order.
    pub fn from_sequences<I>(sequences: I) -> Self
    where
        I: IntoIterator<Item = LatencySequence>,
    {
        let mut combined = LatencySequence::new();
        let mut workers = 0;
        for sequence in sequences {
            combined.merge(sequence);
            workers += 1;
        }
        Self {
            samples: combined.samples,
            failures: combined.failures,
            workers,
        }
    }

    pub fn samples(&self) -> &[LatencySample] {
        &self.samples
    }

    /// Failed invocations across all workers, whether or not they produced a sample.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Number of worker sequences that were joined.
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<LatencySample> {
        self.samples
    }
}

impl From<Vec<LatencySample>> for LatencySet {
    fn from(samples: Vec<LatencySample>) -> Self {
        Self {
            samples,
            failures: 0,
            workers: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence(nanos: &[u64], failures: u64) -> LatencySequence {
        let mut seq = LatencySequence::new();
        for n in nanos {
            seq.record(LatencySample::from_nanos(*n));
        }
        for _ in 0..failures {
            seq.record_failure();
        }
        seq
    }

    #[test]
    fn flattening_keeps_worker_order_and_sizes() {
        let seqs = vec![sequence(&[3, 1], 0), sequence(&[], 2), sequence(&[7, 8, 9], 1)];
        let expected: usize = seqs.iter().map(LatencySequence::len).sum();

        let set = LatencySet::from_sequences(seqs);

        assert_eq!(set.len(), expected);
        assert_eq!(set.workers(), 3);
        assert_eq!(set.failures(), 3);
        let nanos: Vec<u64> = set.samples().iter().map(|s| s.as_nanos()).collect();
        assert_eq!(nanos, vec![3, 1, 7, 8, 9]);
    }

    #[test]
    fn empty_join_is_empty() {
        let set = LatencySet::from_sequences(Vec::new());
        assert!(set.is_empty());
        assert_eq!(set.workers(), 0);
    }
}
