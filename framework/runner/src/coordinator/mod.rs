//! Runs a load test plan across a pool of worker processes.
//!
//! A [Coordinator] splits the plan with [divide_work], starts one worker per share and then
//! reduces everything the workers report into a single stream of [CoordinatorEvent]s. All run state
//! lives in one task, which handles worker output, the reporting timer and shutdown in turn.

mod aggregator;
mod error;
mod events;
mod phase;
mod router;
mod supervisor;

use std::time::Duration;

use surge_core::prelude::{
    DelegatedShutdownListener, RunOptions, RunOpts, Script, WorkerCommand, WorkerId,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::distribute::divide_work;
use crate::pool::PoolSize;
use crate::types::SurgeResult;

use router::{Progress, RunState};
use supervisor::{spawn_worker, FromWorker, WorkerPool};

pub use error::CoordinatorError;
pub use events::CoordinatorEvent;
pub use supervisor::WorkerLauncher;

use events::EventSink;

/// A run that has not been started yet.
///
/// [Coordinator::run] consumes the coordinator, so a plan can only be run once per instance.
#[derive(Debug)]
pub struct Coordinator {
    script: Script,
    payload: serde_json::Value,
    options: RunOptions,
    pool_size: PoolSize,
    launcher: Option<WorkerLauncher>,
    shutdown_listener: Option<DelegatedShutdownListener>,
}

impl Coordinator {
    pub fn new(script: Script, payload: serde_json::Value, options: RunOptions) -> Self {
        Self {
            script,
            payload,
            options,
            pool_size: PoolSize::default(),
            launcher: None,
            shutdown_listener: None,
        }
    }

    pub fn with_pool_size(mut self, pool_size: PoolSize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Start workers with this launcher instead of the located `surge-worker` binary.
    pub fn with_launcher(mut self, launcher: WorkerLauncher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Stop the run, and every worker, when this listener fires.
    pub fn with_shutdown_listener(mut self, listener: DelegatedShutdownListener) -> Self {
        self.shutdown_listener = Some(listener);
        self
    }

    /// Spawn the workers, send each its share of the plan and start coordinating.
    ///
    /// Must be called from within a Tokio runtime. Any worker that was started is killed again if a
    /// later worker fails to start.
    pub fn run(self) -> SurgeResult<RunningCoordinator> {
        self.script.validate()?;

        let launcher = match self.launcher {
            Some(launcher) => launcher,
            None => WorkerLauncher::locate()?,
        };
        let interval = Duration::from_secs(self.script.config.stats_interval);
        let shares = divide_work(&self.script, self.pool_size);

        log::info!(
            "Starting {} worker(s), reporting every {}s",
            shares.len(),
            interval.as_secs()
        );

        let (inbound_sender, inbound) = tokio::sync::mpsc::unbounded_channel();
        let mut workers = WorkerPool::default();
        for share in shares {
            // Dropping the pool on error kills the workers that were already started.
            let handle = spawn_worker(&launcher, inbound_sender.clone())?;
            handle.send(WorkerCommand::Run {
                opts: RunOpts {
                    script: share,
                    payload: self.payload.clone(),
                    options: self.options.clone(),
                },
            })?;
            workers.insert(handle)?;
        }
        // Workers hold the only senders, the channel closes once every worker task has ended.
        drop(inbound_sender);

        let worker_ids = workers.ids();
        let (event_sender, events) = tokio::sync::mpsc::unbounded_channel();
        let task = tokio::spawn(coordinate(
            RunState::new(workers),
            inbound,
            EventSink::new(event_sender),
            interval,
            self.shutdown_listener,
        ));

        Ok(RunningCoordinator {
            events,
            worker_ids,
            task,
        })
    }
}

/// A run in progress. Events are buffered until they are read, so nothing is lost if the caller is
/// slow to start listening.
#[derive(Debug)]
pub struct RunningCoordinator {
    events: UnboundedReceiver<CoordinatorEvent>,
    worker_ids: Vec<WorkerId>,
    task: JoinHandle<()>,
}

impl RunningCoordinator {
    /// Process ids of the workers started for this run.
    pub fn worker_ids(&self) -> &[WorkerId] {
        &self.worker_ids
    }

    /// The next event, or `None` once the run has ended and every event has been read.
    pub async fn next_event(&mut self) -> Option<CoordinatorEvent> {
        self.events.recv().await
    }

    /// Whether the run has completed or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

async fn coordinate(
    mut state: RunState,
    mut inbound: UnboundedReceiver<FromWorker>,
    events: EventSink,
    interval: Duration,
    mut shutdown_listener: Option<DelegatedShutdownListener>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = inbound.recv() => {
                let Some(message) = message else {
                    // Every worker task has ended, which cannot happen before each one delivered
                    // its exit, so the run is already complete.
                    log::debug!("All worker channels closed");
                    break;
                };
                if state.route(message, &events) == Progress::Completed {
                    break;
                }
            }
            _ = ticker.tick() => {
                state.flush(&events);
            }
            _ = wait_for_shutdown(&mut shutdown_listener) => {
                log::info!("Shutdown requested, stopping workers");
                state.cancel(&events);
                break;
            }
        }
    }

    log::debug!("Coordinator finished");
}

async fn wait_for_shutdown(listener: &mut Option<DelegatedShutdownListener>) {
    match listener {
        Some(listener) => listener.wait_for_shutdown().await,
        None => std::future::pending().await,
    }
}
