use std::time::{Duration, Instant};

use chrono::Utc;

use crate::StatsSnapshot;

/// Tracks a single operation, such as a request, from the moment it starts.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    operation_id: String,
    started: Instant,
}

impl OperationRecord {
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            started: Instant::now(),
        }
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Accumulates measurements for the current reporting interval.
///
/// Workers call [StatsRecorder::take] once per interval to cut a [StatsSnapshot] and start a new
/// interval.
#[derive(Debug)]
pub struct StatsRecorder {
    current: StatsSnapshot,
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            current: empty_interval(),
        }
    }

    pub fn scenario_created(&mut self) {
        self.current.scenarios_created += 1;
    }

    pub fn scenario_completed(&mut self) {
        self.current.scenarios_completed += 1;
    }

    /// Record a finished operation, `Ok` with its status code or `Err` with an error name.
    pub fn record_operation(&mut self, record: OperationRecord, outcome: Result<u16, String>) {
        let elapsed_ms = record.elapsed().as_micros() as f64 / 1000.0;
        match outcome {
            Ok(code) => {
                self.current.requests_completed += 1;
                self.current.latencies.push(elapsed_ms);
                *self.current.codes.entry(code.to_string()).or_default() += 1;
            }
            Err(error) => {
                log::trace!("Operation {} failed: {error}", record.operation_id());
                *self.current.errors.entry(error).or_default() += 1;
            }
        }
    }

    pub fn increment(&mut self, counter: &str, by: u64) {
        *self.current.counters.entry(counter.to_string()).or_default() += by;
    }

    /// Close the current interval with the given concurrency gauge and start a new one.
    pub fn take(&mut self, concurrency: f64) -> StatsSnapshot {
        let mut snapshot = std::mem::replace(&mut self.current, empty_interval());
        snapshot.period_end = Some(Utc::now().timestamp_millis());
        snapshot.concurrency = concurrency;
        snapshot
    }
}

fn empty_interval() -> StatsSnapshot {
    StatsSnapshot {
        period_start: Some(Utc::now().timestamp_millis()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_starts_a_new_interval() {
        let mut recorder = StatsRecorder::new();
        recorder.scenario_created();
        recorder.record_operation(OperationRecord::new("home"), Ok(200));
        recorder.record_operation(OperationRecord::new("home"), Err("ETIMEDOUT".to_string()));
        recorder.scenario_completed();
        recorder.increment("marker", 2);

        let first = recorder.take(4.0);
        assert_eq!(1, first.scenarios_created);
        assert_eq!(1, first.scenarios_completed);
        assert_eq!(1, first.requests_completed);
        assert_eq!(1, first.latencies.len());
        assert_eq!(Some(&1), first.codes.get("200"));
        assert_eq!(Some(&1), first.errors.get("ETIMEDOUT"));
        assert_eq!(Some(&2), first.counters.get("marker"));
        assert_eq!(4.0, first.concurrency);
        assert!(first.period_start <= first.period_end);

        let second = recorder.take(0.0);
        assert_eq!(0, second.requests_completed);
        assert!(second.latencies.is_empty());
        assert!(second.period_start >= first.period_start);
    }
}
