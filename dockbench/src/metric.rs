use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// A `LatencySample` is the duration of exactly one operation invocation, in nanoseconds.
///
/// Samples are the most granular unit the engine produces. A worker brackets a single
/// call with two timestamp captures and records the difference; the sample is never
/// changed afterwards. Samples are collected into a worker-local
/// [`crate::aggregate::LatencySequence`], joined into a
/// [`crate::aggregate::LatencySet`], and finally reduced by
/// [`crate::percentile::PercentileSummary`].
///
/// ## Example
/// ```rust
/// use dockbench::LatencySample;
/// use std::time::Duration;
///
/// let sample = LatencySample::from(Duration::from_millis(5));
/// assert_eq!(sample.as_nanos(), 5_000_000);
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LatencySample(u64);

impl LatencySample {
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Time elapsed from `start` to `end`, saturating at zero and at `u64::MAX` nanoseconds.
    pub fn between(start: Instant, end: Instant) -> Self {
        Self::from(end.saturating_duration_since(start))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_nanos(self.0)
    }
}

impl From<Duration> for LatencySample {
    fn from(value: Duration) -> Self {
        Self(u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn between_measures_elapsed_time() {
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let end = Instant::now();

        assert_eq!(LatencySample::between(start, end).as_nanos(), 5_000_000);
        // reversed timestamps never go negative
        assert_eq!(LatencySample::between(end, start).as_nanos(), 0);
    }

    #[test]
    fn huge_durations_saturate() {
        let sample = LatencySample::from(Duration::MAX);
        assert_eq!(sample.as_nanos(), u64::MAX);
    }
}
