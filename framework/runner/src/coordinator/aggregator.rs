use std::collections::BTreeMap;

use surge_core::prelude::WorkerId;
use surge_instruments::{round, StatsSnapshot};

/// Buffers worker snapshots between flushes and keeps the full history for the final report.
#[derive(Debug, Default)]
pub(crate) struct StatsAggregator {
    /// Received since the last flush.
    pending: Vec<(WorkerId, StatsSnapshot)>,
    /// Everything received during the run.
    history: Vec<StatsSnapshot>,
}

impl StatsAggregator {
    pub(crate) fn record(&mut self, worker: WorkerId, snapshot: StatsSnapshot) {
        self.history.push(snapshot.clone());
        self.pending.push((worker, snapshot));
    }

    /// Combine and clear everything received since the last flush. Returns `None` if nothing was
    /// received.
    ///
    /// The combined concurrency is replaced by [aggregate_concurrency] because a worker can report
    /// more than once per interval, and summing its gauges would count its virtual users twice.
    pub(crate) fn flush(&mut self) -> Option<StatsSnapshot> {
        let pending = std::mem::take(&mut self.pending);

        let mut report = StatsSnapshot::combine_all(pending.iter().map(|(_, snapshot)| snapshot))?;
        report.concurrency = aggregate_concurrency(&pending);

        Some(report)
    }

    /// Combine every snapshot received during the run.
    pub(crate) fn final_report(&self) -> StatsSnapshot {
        StatsSnapshot::combine_all(&self.history).unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Sum of each worker's highest concurrency gauge, rounded to one decimal place.
pub(crate) fn aggregate_concurrency(pending: &[(WorkerId, StatsSnapshot)]) -> f64 {
    let per_worker_max = pending
        .iter()
        .fold(BTreeMap::new(), |mut acc, (worker, snapshot)| {
            let max = acc.entry(*worker).or_insert(snapshot.concurrency);
            *max = f64::max(*max, snapshot.concurrency);
            acc
        });

    round(per_worker_max.values().sum(), 1)
}
