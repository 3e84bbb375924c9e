mod console_reporter;

use surge_core::prelude::Phase;

use crate::StatsSnapshot;

pub use console_reporter::ConsoleReporter;

/// Consumes the reports produced while a run is in progress.
pub trait ReportCollector {
    fn add_phase(&mut self, phase: &Phase);

    /// Record the combined report for one reporting interval.
    fn add_interval(&mut self, report: &StatsSnapshot);

    fn finalize(&self, report: &StatsSnapshot);
}
