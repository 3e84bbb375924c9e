use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Measurements taken by one worker over one reporting interval, or the combination of several
/// such snapshots.
///
/// Snapshots are combined with [StatsSnapshot::combine], which is commutative and associative so
/// that snapshots can be merged in whatever order they arrive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Start of the measured window, milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start: Option<i64>,
    /// End of the measured window, milliseconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_end: Option<i64>,
    pub scenarios_created: u64,
    pub scenarios_completed: u64,
    pub requests_completed: u64,
    /// Response times in milliseconds.
    pub latencies: Vec<f64>,
    /// Response counts keyed by status code.
    pub codes: BTreeMap<String, u64>,
    /// Failure counts keyed by error name.
    pub errors: BTreeMap<String, u64>,
    /// Free form counters.
    pub counters: BTreeMap<String, u64>,
    /// Virtual users that were active when the snapshot was taken.
    pub concurrency: f64,
}

/// Round `value` to `places` decimal places.
pub fn round(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

impl StatsSnapshot {
    /// Merge two snapshots into a new one.
    ///
    /// Concurrency is summed, which is only correct when the inputs come from distinct workers.
    /// Counts saturate at `u64::MAX`.
    pub fn combine(&self, other: &StatsSnapshot) -> StatsSnapshot {
        let mut latencies = Vec::with_capacity(self.latencies.len() + other.latencies.len());
        latencies.extend_from_slice(&self.latencies);
        latencies.extend_from_slice(&other.latencies);
        latencies.sort_unstable_by(f64::total_cmp);

        StatsSnapshot {
            period_start: earliest(self.period_start, other.period_start),
            period_end: latest(self.period_end, other.period_end),
            scenarios_created: self
                .scenarios_created
                .saturating_add(other.scenarios_created),
            scenarios_completed: self
                .scenarios_completed
                .saturating_add(other.scenarios_completed),
            requests_completed: self
                .requests_completed
                .saturating_add(other.requests_completed),
            latencies,
            codes: sum_counts(&self.codes, &other.codes),
            errors: sum_counts(&self.errors, &other.errors),
            counters: sum_counts(&self.counters, &other.counters),
            concurrency: self.concurrency + other.concurrency,
        }
    }

    /// Fold any number of snapshots with [StatsSnapshot::combine], `None` if there are none.
    pub fn combine_all<'a>(
        snapshots: impl IntoIterator<Item = &'a StatsSnapshot>,
    ) -> Option<StatsSnapshot> {
        let mut snapshots = snapshots.into_iter();
        let first = snapshots.next()?.combine(&StatsSnapshot::default());
        Some(snapshots.fold(first, |acc, snapshot| acc.combine(snapshot)))
    }

    /// Completed requests per second over the measured window.
    pub fn request_rate(&self) -> Option<f64> {
        let (start, end) = (self.period_start?, self.period_end?);
        if end <= start {
            return None;
        }

        Some(self.requests_completed as f64 / ((end as f64 - start as f64) / 1000.0))
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        if self.latencies.is_empty() {
            return None;
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_unstable_by(f64::total_cmp);

        Some(LatencySummary {
            count: sorted.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean: sorted.iter().sum::<f64>() / sorted.len() as f64,
            median: nearest_rank(&sorted, 50.0),
            p95: nearest_rank(&sorted, 95.0),
            p99: nearest_rank(&sorted, 99.0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

fn nearest_rank(sorted: &[f64], percentile: f64) -> f64 {
    let rank = ((percentile / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn earliest(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn latest(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn sum_counts(a: &BTreeMap<String, u64>, b: &BTreeMap<String, u64>) -> BTreeMap<String, u64> {
    let mut out = a.clone();
    for (key, count) in b {
        let total = out.entry(key.clone()).or_default();
        *total = total.saturating_add(*count);
    }
    out
}
