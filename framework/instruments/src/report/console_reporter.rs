mod metrics_table;

use surge_core::prelude::Phase;
use tabled::settings::Style;
use tabled::Table;

use crate::report::console_reporter::metrics_table::metric_rows;
use crate::report::ReportCollector;
use crate::StatsSnapshot;

/// Prints every interval report to stdout as it arrives and a summary at the end of the run.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    phases: Vec<Phase>,
    intervals: usize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn print_report(title: &str, report: &StatsSnapshot) {
        println!("\n{title}");

        let mut table = Table::new(metric_rows(report));
        table.with(Style::modern());

        println!("{table}");
    }
}

impl ReportCollector for ConsoleReporter {
    fn add_phase(&mut self, phase: &Phase) {
        match phase.spec() {
            Some(spec) => println!(
                "\nPhase started: {} (index {}, {}s)",
                phase.display_name(),
                phase.index,
                spec.planned_duration_s()
            ),
            None => println!(
                "\nPhase started: {} (index {})",
                phase.display_name(),
                phase.index
            ),
        }
        self.phases.push(phase.clone());
    }

    fn add_interval(&mut self, report: &StatsSnapshot) {
        self.intervals += 1;
        Self::print_report(&format!("Report #{}", self.intervals), report);
    }

    fn finalize(&self, report: &StatsSnapshot) {
        Self::print_report(
            &format!(
                "Summary of run ({} phases, {} reports)",
                self.phases.len(),
                self.intervals
            ),
            report,
        );
    }
}
