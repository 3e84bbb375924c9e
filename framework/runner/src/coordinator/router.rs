use surge_core::prelude::{Decoded, ProtocolViolation, WorkerId, WorkerMessage};
use surge_instruments::StatsSnapshot;

use crate::coordinator::aggregator::StatsAggregator;
use crate::coordinator::error::CoordinatorError;
use crate::coordinator::events::{CoordinatorEvent, EventSink};
use crate::coordinator::phase::PhaseTracker;
use crate::coordinator::supervisor::{FromWorker, Inbound, WorkerPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    Running,
    Completed,
}

/// Everything the coordinator knows about a run in progress.
///
/// Only the coordinator task touches this, so worker messages are applied one at a time.
#[derive(Debug)]
pub(crate) struct RunState {
    workers: WorkerPool,
    phases: PhaseTracker,
    stats: StatsAggregator,
    completed: bool,
}

impl RunState {
    pub(crate) fn new(workers: WorkerPool) -> Self {
        Self {
            workers,
            phases: PhaseTracker::default(),
            stats: StatsAggregator::default(),
            completed: false,
        }
    }

    pub(crate) fn route(&mut self, message: FromWorker, events: &EventSink) -> Progress {
        let FromWorker { worker, inbound } = message;
        if self.completed {
            return Progress::Completed;
        }
        if self.workers.get(worker).is_none() {
            log::warn!("Ignoring output from unknown worker {worker}");
            return self.progress();
        }

        match inbound {
            Inbound::Line(line) => self.line(worker, &line, events),
            Inbound::Exited(status) => self.worker_exited(worker, status, events),
        }
    }

    fn line(&mut self, worker: WorkerId, line: &str, events: &EventSink) -> Progress {
        match WorkerMessage::<StatsSnapshot>::decode(line) {
            Ok(Decoded::Message(message)) => self.dispatch(worker, message, events),
            Ok(Decoded::Unrecognized { event }) => {
                log::trace!("Ignoring unrecognized event {event:?} from worker {worker}");
                self.progress()
            }
            Ok(Decoded::NotJson) => {
                let target = format!("surge_worker::{worker}");
                log::debug!(target: &target, "{line}");
                self.progress()
            }
            Err(source) => {
                events.error(CoordinatorError::ProtocolViolation { worker, source });
                self.progress()
            }
        }
    }

    fn dispatch(
        &mut self,
        worker: WorkerId,
        message: WorkerMessage<StatsSnapshot>,
        events: &EventSink,
    ) -> Progress {
        let kind = message.kind();
        match message {
            WorkerMessage::PhaseStarted { phase } => {
                if self.phases.observe(&phase) {
                    log::info!("Phase started: {}", phase.display_name());
                    events.emit(CoordinatorEvent::PhaseStarted(phase));
                }
            }
            WorkerMessage::PhaseCompleted { .. } => {
                log::trace!("Worker {worker} completed a phase");
            }
            WorkerMessage::Stats { pid, stats } => {
                if self.check_pid(worker, pid, kind, events) {
                    self.stats.record(worker, stats);
                }
            }
            WorkerMessage::Done { pid } => {
                if self.check_pid(worker, pid, kind, events) {
                    return self.worker_done(worker, events);
                }
            }
        }

        self.progress()
    }

    /// A message must name the process that sent it.
    fn check_pid(
        &self,
        worker: WorkerId,
        pid: WorkerId,
        kind: &str,
        events: &EventSink,
    ) -> bool {
        if pid == worker {
            return true;
        }

        events.error(CoordinatorError::ProtocolViolation {
            worker,
            source: ProtocolViolation::new(
                kind,
                format!("message claims to be from worker {pid}"),
            ),
        });
        false
    }

    fn worker_done(&mut self, worker: WorkerId, events: &EventSink) -> Progress {
        let Some(handle) = self.workers.get_mut(worker) else {
            return self.progress();
        };
        if !handle.mark_done() {
            log::debug!("Worker {worker} reported done more than once");
            return self.progress();
        }
        handle.terminate();

        let remaining = self.workers.remaining();
        log::debug!("Worker {worker} is done, {remaining} remaining");
        if remaining == 0 {
            self.complete(events);
        }

        self.progress()
    }

    fn worker_exited(&mut self, worker: WorkerId, status: String, events: &EventSink) -> Progress {
        if self.workers.get(worker).is_some_and(|w| w.is_done()) {
            log::trace!("Worker {worker} exited after reporting done");
            return self.progress();
        }

        events.error(CoordinatorError::WorkerExited { worker, status });
        self.worker_done(worker, events)
    }

    /// Emit the combined report for the interval that just ended, if anything was reported.
    pub(crate) fn flush(&mut self, events: &EventSink) {
        if self.completed {
            return;
        }

        match self.stats.flush() {
            Some(report) => events.emit(CoordinatorEvent::Stats(report)),
            None => log::trace!("No stats received this interval"),
        }
    }

    fn complete(&mut self, events: &EventSink) {
        if self.completed {
            return;
        }

        self.flush(events);
        self.completed = true;
        events.emit(CoordinatorEvent::Done(self.stats.final_report()));
    }

    /// Stop every worker. The run ends without a final report.
    pub(crate) fn cancel(&mut self, events: &EventSink) {
        if self.completed {
            return;
        }

        self.workers.terminate_all();
        self.completed = true;
        events.error(CoordinatorError::Cancelled);
    }

    pub(crate) fn progress(&self) -> Progress {
        if self.completed {
            Progress::Completed
        } else {
            Progress::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::supervisor::{WorkerControl, WorkerHandle};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    struct Harness {
        state: RunState,
        events: EventSink,
        received: UnboundedReceiver<CoordinatorEvent>,
        controls: Vec<UnboundedReceiver<WorkerControl>>,
    }

    impl Harness {
        fn new(pids: &[u32]) -> Self {
            let mut pool = WorkerPool::default();
            let mut controls = Vec::new();
            for pid in pids {
                let (sender, receiver) = unbounded_channel();
                pool.insert(WorkerHandle::new(WorkerId::new(*pid), sender))
                    .unwrap();
                controls.push(receiver);
            }
            let (sender, received) = unbounded_channel();

            Self {
                state: RunState::new(pool),
                events: EventSink::new(sender),
                received,
                controls,
            }
        }

        fn line(&mut self, pid: u32, line: serde_json::Value) -> Progress {
            self.raw(pid, &line.to_string())
        }

        fn raw(&mut self, pid: u32, line: &str) -> Progress {
            self.state.route(
                FromWorker {
                    worker: WorkerId::new(pid),
                    inbound: Inbound::Line(line.to_string()),
                },
                &self.events,
            )
        }

        fn exited(&mut self, pid: u32) -> Progress {
            self.state.route(
                FromWorker {
                    worker: WorkerId::new(pid),
                    inbound: Inbound::Exited("exit status: 1".to_string()),
                },
                &self.events,
            )
        }

        fn drain(&mut self) -> Vec<CoordinatorEvent> {
            std::iter::from_fn(|| self.received.try_recv().ok()).collect()
        }
    }

    fn stats(pid: u32, requests: u64, concurrency: f64) -> serde_json::Value {
        json!({
            "event": "stats",
            "pid": pid,
            "stats": { "requestsCompleted": requests, "concurrency": concurrency }
        })
    }

    fn done(pid: u32) -> serde_json::Value {
        json!({ "event": "done", "pid": pid })
    }

    fn phase_started(index: u32) -> serde_json::Value {
        json!({ "event": "phaseStarted", "phase": { "index": index, "duration": 10, "arrivalRate": 1 } })
    }

    #[test]
    fn phases_are_announced_once() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, phase_started(0));
        harness.line(2, phase_started(0));
        harness.line(2, phase_started(1));
        harness.line(1, phase_started(1));
        harness.line(1, json!({ "event": "phaseCompleted" }));

        let indices = harness
            .drain()
            .into_iter()
            .map(|event| match event {
                CoordinatorEvent::PhaseStarted(phase) => phase.index,
                other => panic!("unexpected event {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(vec![0, 1], indices);
    }

    #[test]
    fn phase_metadata_is_passed_through() {
        let mut harness = Harness::new(&[1]);

        let progress = harness.line(
            1,
            json!({ "event": "phaseStarted", "phase": { "index": 0, "duration": 2.5, "arrivalRate": 1 } }),
        );
        assert_eq!(Progress::Running, progress);
        harness.line(
            1,
            json!({ "event": "phaseStarted", "phase": { "index": 1, "duration": 2, "maxVusers": 10 } }),
        );

        let metadata = harness
            .drain()
            .into_iter()
            .map(|event| match event {
                CoordinatorEvent::PhaseStarted(phase) => {
                    (phase.index, serde_json::Value::Object(phase.metadata))
                }
                other => panic!("unexpected event {other:?}"),
            })
            .collect::<Vec<_>>();
        assert_eq!(
            vec![
                (0, json!({ "duration": 2.5, "arrivalRate": 1 })),
                (1, json!({ "duration": 2, "maxVusers": 10 })),
            ],
            metadata
        );
    }

    #[test]
    fn oversized_counts_do_not_stop_the_run() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, stats(1, u64::MAX, 1.0));
        harness.line(2, stats(2, 1, 1.0));
        harness.line(1, done(1));
        assert_eq!(Progress::Completed, harness.line(2, done(2)));

        let events = harness.drain();
        let Some(CoordinatorEvent::Done(report)) = events.last() else {
            panic!("unexpected events {events:?}");
        };
        assert_eq!(u64::MAX, report.requests_completed);
    }

    #[test]
    fn not_complete_until_every_worker_is_done() {
        let mut harness = Harness::new(&[1, 2, 3]);

        assert_eq!(Progress::Running, harness.line(1, done(1)));
        assert_eq!(Progress::Running, harness.line(3, done(3)));
        assert!(harness.drain().is_empty());

        assert_eq!(Progress::Completed, harness.line(2, done(2)));
        assert!(matches!(
            harness.drain().as_slice(),
            [CoordinatorEvent::Done(_)]
        ));
    }

    #[test]
    fn done_is_emitted_exactly_once() {
        let mut harness = Harness::new(&[1]);

        harness.line(1, done(1));
        harness.line(1, done(1));
        harness.exited(1);
        harness.state.flush(&harness.events);

        let events = harness.drain();
        assert_eq!(1, events.len());
        assert!(matches!(events[0], CoordinatorEvent::Done(_)));
    }

    #[test]
    fn done_worker_is_terminated() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(2, done(2));

        assert!(harness.controls[0].try_recv().is_err());
        assert_eq!(
            Ok(WorkerControl::Terminate),
            harness.controls[1].try_recv()
        );
    }

    #[test]
    fn completion_flushes_pending_stats_before_final_report() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, stats(1, 3, 2.0));
        harness.state.flush(&harness.events);
        harness.line(2, stats(2, 4, 1.0));
        harness.line(1, done(1));
        harness.line(2, done(2));

        let events = harness.drain();
        let [CoordinatorEvent::Stats(first), CoordinatorEvent::Stats(second), CoordinatorEvent::Done(last)] =
            events.as_slice()
        else {
            panic!("unexpected events {events:?}");
        };
        assert_eq!(3, first.requests_completed);
        assert_eq!(4, second.requests_completed);
        assert_eq!(7, last.requests_completed);
    }

    #[test]
    fn empty_interval_emits_nothing() {
        let mut harness = Harness::new(&[1]);

        harness.state.flush(&harness.events);

        assert!(harness.drain().is_empty());
    }

    #[test]
    fn mismatched_pid_is_rejected() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, stats(2, 5, 1.0));
        assert_eq!(Progress::Running, harness.line(1, done(2)));
        harness.state.flush(&harness.events);

        let events = harness.drain();
        assert_eq!(2, events.len());
        for event in events {
            let CoordinatorEvent::Error(CoordinatorError::ProtocolViolation { worker, source }) =
                &event
            else {
                panic!("unexpected event {event:?}");
            };
            assert_eq!(WorkerId::new(1), *worker);
            assert!(["stats", "done"].contains(&source.event()));
        }
        assert_eq!(2, harness.state.workers.remaining());
    }

    #[test]
    fn malformed_message_leaves_state_untouched() {
        let mut harness = Harness::new(&[1]);

        harness.raw(1, r#"{"event":"stats","pid":1,"stats":"lots"}"#);
        harness.raw(1, "starting virtual users");
        harness.raw(1, r#"{"event":"heartbeat"}"#);
        harness.state.flush(&harness.events);

        let events = harness.drain();
        assert!(matches!(
            events.as_slice(),
            [CoordinatorEvent::Error(CoordinatorError::ProtocolViolation { .. })]
        ));
        assert_eq!(0, harness.state.stats.pending_len());
    }

    #[test]
    fn exit_without_done_counts_as_done() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, stats(1, 2, 1.0));
        harness.line(2, done(2));
        assert_eq!(Progress::Completed, harness.exited(1));

        let events = harness.drain();
        assert!(matches!(
            events.as_slice(),
            [
                CoordinatorEvent::Error(CoordinatorError::WorkerExited { .. }),
                CoordinatorEvent::Stats(_),
                CoordinatorEvent::Done(_)
            ]
        ));
    }

    #[test]
    fn cancel_terminates_everyone_without_report() {
        let mut harness = Harness::new(&[1, 2]);

        harness.line(1, stats(1, 2, 1.0));
        harness.state.cancel(&harness.events);
        assert_eq!(Progress::Completed, harness.state.progress());
        assert_eq!(Progress::Completed, harness.line(2, done(2)));

        assert_eq!(
            vec![CoordinatorEvent::Error(CoordinatorError::Cancelled)],
            harness.drain()
        );
        for control in harness.controls.iter_mut() {
            assert_eq!(Ok(WorkerControl::Terminate), control.try_recv());
        }
    }

    #[test]
    fn output_from_unknown_worker_is_ignored() {
        let mut harness = Harness::new(&[1]);

        assert_eq!(Progress::Running, harness.line(9, done(9)));
        assert!(harness.drain().is_empty());
    }
}
