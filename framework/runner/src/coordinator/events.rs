use surge_core::prelude::Phase;
use surge_instruments::StatsSnapshot;
use tokio::sync::mpsc::UnboundedSender;

use crate::coordinator::error::CoordinatorError;

/// Everything a caller can observe about a run, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinatorEvent {
    /// The first worker to reach a phase has started it. Indices strictly increase.
    PhaseStarted(Phase),
    /// Combined report for one reporting interval.
    Stats(StatsSnapshot),
    /// Every worker is done. Carries the report for the whole run and is always the last event of a
    /// run that was not cancelled.
    Done(StatsSnapshot),
    Error(CoordinatorError),
}

#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    sender: UnboundedSender<CoordinatorEvent>,
}

impl EventSink {
    pub(crate) fn new(sender: UnboundedSender<CoordinatorEvent>) -> Self {
        Self { sender }
    }

    pub(crate) fn emit(&self, event: CoordinatorEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Dropping coordinator event, nobody is listening");
        }
    }

    pub(crate) fn error(&self, error: CoordinatorError) {
        log::warn!("{error}");
        self.emit(CoordinatorEvent::Error(error));
    }
}
