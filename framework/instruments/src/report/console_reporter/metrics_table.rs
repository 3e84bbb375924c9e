use chrono::DateTime;
use itertools::Itertools;
use tabled::Tabled;

use crate::StatsSnapshot;

#[derive(Tabled, Debug, PartialEq)]
pub struct MetricRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl MetricRow {
    fn new(metric: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            value: value.into(),
        }
    }
}

pub fn metric_rows(report: &StatsSnapshot) -> Vec<MetricRow> {
    let mut rows = vec![
        MetricRow::new(
            "Window",
            format!(
                "{} - {}",
                format_timestamp(report.period_start),
                format_timestamp(report.period_end)
            ),
        ),
        MetricRow::new("Scenarios created", report.scenarios_created.to_string()),
        MetricRow::new("Scenarios completed", report.scenarios_completed.to_string()),
        MetricRow::new("Requests completed", report.requests_completed.to_string()),
    ];

    if let Some(rate) = report.request_rate() {
        rows.push(MetricRow::new("Request rate", format!("{rate:.2}/s")));
    }

    if let Some(latency) = report.latency_summary() {
        rows.push(MetricRow::new(
            "Latency (ms)",
            format!(
                "min {:.2}, median {:.2}, p95 {:.2}, p99 {:.2}, max {:.2}",
                latency.min, latency.median, latency.p95, latency.p99, latency.max
            ),
        ));
    }

    rows.push(MetricRow::new(
        "Concurrency",
        format!("{:.1}", report.concurrency),
    ));

    for (label, counts) in [
        ("Codes", &report.codes),
        ("Errors", &report.errors),
        ("Counters", &report.counters),
    ] {
        if !counts.is_empty() {
            rows.push(MetricRow::new(
                label,
                counts.iter().map(|(k, v)| format!("{k}: {v}")).join(", "),
            ));
        }
    }

    rows
}

fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn rows_for_report() {
        let report = StatsSnapshot {
            period_start: Some(0),
            period_end: Some(2_000),
            scenarios_created: 4,
            scenarios_completed: 3,
            requests_completed: 6,
            latencies: vec![1.0, 2.0, 3.0],
            codes: BTreeMap::from([("200".to_string(), 5), ("404".to_string(), 1)]),
            errors: BTreeMap::new(),
            counters: BTreeMap::new(),
            concurrency: 9.0,
        };

        let rows = metric_rows(&report);

        assert_eq!(
            vec![
                MetricRow::new("Window", "00:00:00 - 00:00:02"),
                MetricRow::new("Scenarios created", "4"),
                MetricRow::new("Scenarios completed", "3"),
                MetricRow::new("Requests completed", "6"),
                MetricRow::new("Request rate", "3.00/s"),
                MetricRow::new(
                    "Latency (ms)",
                    "min 1.00, median 2.00, p95 3.00, p99 3.00, max 3.00"
                ),
                MetricRow::new("Concurrency", "9.0"),
                MetricRow::new("Codes", "200: 5, 404: 1"),
            ],
            rows
        );
    }

    #[test]
    fn rows_for_empty_report() {
        let rows = metric_rows(&StatsSnapshot::default());

        assert_eq!(MetricRow::new("Window", "- - -"), rows[0]);
        assert_eq!(5, rows.len());
    }
}
