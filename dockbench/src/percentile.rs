//! Percentile reduction of a [`LatencySet`].
//!
//! The summary for a threshold `r` is a *tail average*: the mean of the
//! `n = max(ceil((1 - r) * len), 1)` largest samples, converted from nanoseconds to
//! milliseconds. It is not an order statistic; for small sample counts it reports the
//! typical cost of the slowest calls instead of a single outlier.
//!
//! ```text
//! samples = [1, 2, ..., 100] ns
//! p99 -> n = 1  -> mean(100)       = 100 ns
//! p50 -> n = 50 -> mean(51..=100)  = 75.5 ns
//! ```
//!
//! An empty set reduces to zero for every threshold.
use serde::{Deserialize, Serialize};

use crate::aggregate::LatencySet;
use crate::error::ConfigError;

/// Nanoseconds per reporting unit (milliseconds).
pub const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// The ordered set of rates a process reports, each in (0, 1).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Thresholds(Vec<f64>);

impl Thresholds {
    pub fn new(rates: Vec<f64>) -> Result<Self, ConfigError> {
        if rates.is_empty() {
            return Err(ConfigError::NoThresholds);
        }
        if let Some(bad) = rates.iter().find(|r| !(**r > 0.0 && **r < 1.0)) {
            return Err(ConfigError::InvalidThreshold(*bad));
        }
        Ok(Self(rates))
    }

    pub fn rates(&self) -> &[f64] {
        &self.0
    }

    /// Column label of each threshold, e.g. `%50` or `%99.9`.
    pub fn labels(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|r| format!("%{}", (r * 100.0 * 1e6).round() / 1e6))
            .collect()
    }
}

impl Default for Thresholds {
    /// p50, p75, p95 and p99.
    fn default() -> Self {
        Self(vec![0.5, 0.75, 0.95, 0.99])
    }
}

impl TryFrom<Vec<f64>> for Thresholds {
    type Error = ConfigError;

    fn try_from(rates: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(rates)
    }
}

impl From<Thresholds> for Vec<f64> {
    fn from(value: Thresholds) -> Self {
        value.0
    }
}

/// Number of worst samples averaged for `rate` over `len` samples.
///
/// `(1 - rate) * len` is rounded up, except when it is within floating-point noise of
/// an integer: `(1 - 0.99) * 100` evaluates to `1.0000000000000009` and must count as
/// one sample, not two. The result is clamped to `[1, len]`.
pub fn tail_len(rate: f64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let exact = (1.0 - rate) * len as f64;
    let nearest = exact.round();
    let n = if (exact - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest
    } else {
        exact.ceil()
    };
    (n as usize).clamp(1, len)
}

/// Tail average in nanoseconds of samples already sorted ascending.
pub fn tail_average(sorted: &[u64], rate: f64) -> f64 {
    let n = tail_len(rate, sorted.len());
    if n == 0 {
        return 0.0;
    }
    let total: u128 = sorted[sorted.len() - n..].iter().map(|&l| l as u128).sum();
    total as f64 / n as f64
}

/// One tail average per threshold, in milliseconds, plus the counts it was derived from.
///
/// Computed once per run and handed to a [`crate::report::Reporter`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PercentileSummary {
    pub thresholds: Thresholds,
    /// Tail average per threshold, in the same order, in milliseconds.
    pub values_ms: Vec<f64>,
    pub samples: usize,
    pub failures: u64,
}

impl PercentileSummary {
    pub fn compute(set: &LatencySet, thresholds: &Thresholds) -> Self {
        let mut sorted: Vec<u64> = set.samples().iter().map(|s| s.as_nanos()).collect();
        sorted.sort();
        let values_ms = thresholds
            .rates()
            .iter()
            .map(|&rate| tail_average(&sorted, rate) / NANOS_PER_MILLI)
            .collect();
        Self {
            thresholds: thresholds.clone(),
            values_ms,
            samples: set.len(),
            failures: set.failures(),
        }
    }

    /// Summary value for `rate`, if it is one of the thresholds.
    pub fn get(&self, rate: f64) -> Option<f64> {
        self.thresholds
            .rates()
            .iter()
            .position(|&r| r == rate)
            .map(|i| self.values_ms[i])
    }

    /// `(rate, value_ms)` pairs in threshold order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.thresholds
            .rates()
            .iter()
            .copied()
            .zip(self.values_ms.iter().copied())
    }
}

impl From<&LatencySet> for PercentileSummary {
    fn from(set: &LatencySet) -> Self {
        Self::compute(set, &Thresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::LatencySample;
    use proptest::prelude::*;

    fn set(nanos: impl IntoIterator<Item = u64>) -> LatencySet {
        LatencySet::from(
            nanos
                .into_iter()
                .map(LatencySample::from_nanos)
                .collect::<Vec<_>>(),
        )
    }

    /// `max(ceil((1 - permille/1000) * len), 1)` in exact integer arithmetic.
    fn exact_tail_len(permille: u64, len: usize) -> usize {
        let worst = (1000 - permille) as usize * len;
        worst.div_ceil(1000).max(1)
    }

    /// Mean of the `exact_tail_len` largest values, the slow way.
    fn reference(values: &[u64], permille: u64) -> f64 {
        let mut v = values.to_vec();
        v.sort_unstable_by(|a, b| b.cmp(a));
        let n = exact_tail_len(permille, v.len());
        v[..n].iter().map(|&x| x as f64).sum::<f64>() / n as f64
    }

    #[test]
    fn one_to_hundred() {
        let sorted: Vec<u64> = (1..=100).collect();
        assert_eq!(tail_average(&sorted, 0.99), 100.0);
        assert_eq!(tail_average(&sorted, 0.95), 98.0);
        assert_eq!(tail_average(&sorted, 0.75), 88.0);
        assert_eq!(tail_average(&sorted, 0.5), 75.5);
    }

    #[test]
    fn tail_len_ignores_float_noise() {
        assert_eq!(tail_len(0.99, 100), 1);
        assert_eq!(tail_len(0.95, 100), 5);
        assert_eq!(tail_len(0.99, 1000), 10);
        assert_eq!(tail_len(0.999, 1000), 1);
        // a genuine fraction still rounds up
        assert_eq!(tail_len(0.5, 3), 2);
        assert_eq!(tail_len(0.99, 150), 2);
    }

    #[test]
    fn tiny_sets_use_at_least_the_largest_sample() {
        assert_eq!(tail_len(0.99, 1), 1);
        assert_eq!(tail_len(0.9999, 10), 1);
        assert_eq!(tail_average(&[3, 9], 0.99), 9.0);
    }

    #[test]
    fn empty_set_is_all_zeros() {
        let summary = PercentileSummary::from(&LatencySet::default());
        assert_eq!(summary.values_ms, vec![0.0; 4]);
        assert_eq!(summary.samples, 0);
    }

    #[test]
    fn summary_is_in_milliseconds() {
        let summary = PercentileSummary::from(&set(std::iter::repeat(5_000_000).take(200)));
        for (_, value) in summary.iter() {
            assert_eq!(value, 5.0);
        }
        assert_eq!(summary.get(0.99), Some(5.0));
        assert_eq!(summary.get(0.9), None);
    }

    #[test]
    fn summary_of_one_to_hundred() {
        let summary = PercentileSummary::from(&set(1..=100));
        assert_eq!(summary.get(0.5), Some(75.5 / NANOS_PER_MILLI));
        assert_eq!(summary.get(0.99), Some(100.0 / NANOS_PER_MILLI));
    }

    #[test]
    fn thresholds_are_validated() {
        assert_eq!(Thresholds::new(vec![]), Err(ConfigError::NoThresholds));
        assert_eq!(Thresholds::new(vec![0.5, 1.0]), Err(ConfigError::InvalidThreshold(1.0)));
        assert_eq!(Thresholds::new(vec![0.0]), Err(ConfigError::InvalidThreshold(0.0)));
        assert!(Thresholds::new(vec![0.9, 0.999]).is_ok());
    }

    #[test]
    fn threshold_labels() {
        assert_eq!(Thresholds::default().labels(), vec!["%50", "%75", "%95", "%99"]);
        let fine = Thresholds::new(vec![0.999]).unwrap();
        assert_eq!(fine.labels(), vec!["%99.9"]);
    }

    #[test]
    fn thresholds_deserialize_through_validation() {
        let ok: Thresholds = serde_json::from_str("[0.5, 0.9]").unwrap();
        assert_eq!(ok.rates(), &[0.5, 0.9]);
        assert!(serde_json::from_str::<Thresholds>("[1.5]").is_err());
    }

    proptest! {
        #[test]
        fn matches_mean_of_largest(
            values in prop::collection::vec(0u64..10_000_000_000, 1..300),
            permille in 1u64..1000,
        ) {
            let mut sorted = values.clone();
            sorted.sort();
            let got = tail_average(&sorted, permille as f64 / 1000.0);
            let want = reference(&values, permille);
            prop_assert!((got - want).abs() <= want.abs() * 1e-9, "{got} != {want}");
        }

        #[test]
        fn tail_len_is_ceiling_of_the_worst_fraction(
            len in 1usize..5000,
            permille in 1u64..1000,
        ) {
            prop_assert_eq!(
                tail_len(permille as f64 / 1000.0, len),
                exact_tail_len(permille, len)
            );
        }

        #[test]
        fn invariant_under_permutation(
            values in prop::collection::vec(0u64..1_000_000, 0..200).prop_shuffle(),
        ) {
            let mut reversed = values.clone();
            reversed.reverse();
            let thresholds = Thresholds::default();
            let a = PercentileSummary::compute(&set(values), &thresholds);
            let b = PercentileSummary::compute(&set(reversed), &thresholds);
            prop_assert_eq!(a, b);
        }
    }
}
