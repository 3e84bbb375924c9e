use surge_core::prelude::{ProtocolViolation, WorkerId};
use thiserror::Error;

/// Problems observed while a run is in progress. These are delivered to the caller as
/// [crate::prelude::CoordinatorEvent::Error] and do not stop the run by themselves.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinatorError {
    /// The message was dropped without touching the run state.
    #[error("worker {worker} sent a bad message: {source}")]
    ProtocolViolation {
        worker: WorkerId,
        #[source]
        source: ProtocolViolation,
    },

    /// The worker is treated as done so that the run can still complete.
    #[error("worker {worker} exited without reporting done ({status})")]
    WorkerExited { worker: WorkerId, status: String },

    #[error("run cancelled before all workers reported done")]
    Cancelled,
}
