mod recorder;
mod report;
mod snapshot;

pub use recorder::{OperationRecord, StatsRecorder};
pub use report::{ConsoleReporter, ReportCollector};
pub use snapshot::{round, LatencySummary, StatsSnapshot};
