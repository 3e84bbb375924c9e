use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use parking_lot::Mutex;
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use surge_core::prelude::{FlowStep, Phase, ScenarioSpec, Script, WorkerId, WorkerMessage};
use surge_instruments::{OperationRecord, StatsRecorder, StatsSnapshot};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::arrivals::arrival_offsets;
use crate::channel::MessageSender;
use crate::types::WorkerResult;

/// Status code recorded for a simulated request that succeeded.
const SIMULATED_OK: u16 = 200;
/// Error name recorded for a simulated request that failed.
const SIMULATED_ERROR: &str = "ESIMULATED";

/// State shared by the executor and every virtual user.
#[derive(Debug)]
struct Shared {
    recorder: Mutex<StatsRecorder>,
    active_users: AtomicUsize,
}

impl Shared {
    fn concurrency(&self) -> f64 {
        self.active_users.load(Ordering::Acquire) as f64
    }

    fn take_snapshot(&self, pid: WorkerId) -> WorkerMessage<StatsSnapshot> {
        let stats = self.recorder.lock().take(self.concurrency());
        WorkerMessage::Stats { pid, stats }
    }
}

/// Chooses a scenario for each new virtual user, in proportion to the scenario weights.
#[derive(Debug)]
struct ScenarioPicker {
    scenarios: Vec<ScenarioSpec>,
    weights: Option<WeightedIndex<u32>>,
}

impl ScenarioPicker {
    fn new(scenarios: Vec<ScenarioSpec>) -> WorkerResult<Self> {
        let weights = if scenarios.is_empty() {
            log::warn!("The script has no scenarios, virtual users will do nothing");
            None
        } else {
            Some(
                WeightedIndex::new(scenarios.iter().map(|s| s.weight))
                    .context("Scenario weights must not all be zero")?,
            )
        };

        Ok(Self { scenarios, weights })
    }

    fn pick(&self) -> Option<&ScenarioSpec> {
        let weights = self.weights.as_ref()?;
        let index = weights.sample(&mut rand::thread_rng());
        self.scenarios.get(index)
    }
}

/// Run every phase of `script`, reporting to the coordinator through `messages`.
///
/// Returns after the last virtual user has finished and `done` has been queued.
pub(crate) async fn execute(
    script: Script,
    pid: WorkerId,
    messages: MessageSender,
) -> WorkerResult<()> {
    let picker = Arc::new(ScenarioPicker::new(script.scenarios)?);
    let shared = Arc::new(Shared {
        recorder: Mutex::new(StatsRecorder::new()),
        active_users: AtomicUsize::new(0),
    });

    let stats_interval = Duration::from_secs(script.config.stats_interval);
    let reporter = tokio::spawn({
        let shared = shared.clone();
        let messages = messages.clone();
        async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + stats_interval, stats_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                messages.send(shared.take_snapshot(pid));
            }
        }
    });

    let mut users = JoinSet::new();
    for (index, spec) in script.config.phases.into_iter().enumerate() {
        let phase = Phase::from_spec(index as u32, &spec)
            .with_context(|| format!("Failed to describe phase {index}"))?;
        log::info!("Starting {}", phase.display_name());
        messages.send(WorkerMessage::PhaseStarted {
            phase: phase.clone(),
        });

        let started = Instant::now();
        for offset in arrival_offsets(&spec) {
            tokio::time::sleep_until(started + offset).await;
            users.spawn(virtual_user(picker.clone(), shared.clone()));
        }
        tokio::time::sleep_until(started + Duration::from_secs(spec.planned_duration_s())).await;

        log::debug!("Completed {}", phase.display_name());
        messages.send(WorkerMessage::PhaseCompleted { phase: Some(phase) });
    }

    log::debug!("Waiting for {} virtual user(s) to finish", users.len());
    while let Some(result) = users.join_next().await {
        if let Err(e) = result {
            log::error!("Virtual user failed: {e}");
        }
    }

    // Wait for the reporter to actually stop so that `done` is the last message.
    reporter.abort();
    let _ = reporter.await;
    messages.send(shared.take_snapshot(pid));
    messages.send(WorkerMessage::Done { pid });

    Ok(())
}

async fn virtual_user(picker: Arc<ScenarioPicker>, shared: Arc<Shared>) {
    shared.active_users.fetch_add(1, Ordering::AcqRel);
    shared.recorder.lock().scenario_created();

    if let Some(scenario) = picker.pick() {
        for step in &scenario.flow {
            run_step(step, &shared).await;
        }
    }

    shared.recorder.lock().scenario_completed();
    shared.active_users.fetch_sub(1, Ordering::AcqRel);
}

async fn run_step(step: &FlowStep, shared: &Shared) {
    match step {
        FlowStep::Think { seconds } => {
            let think = Duration::try_from_secs_f64(*seconds).unwrap_or_default();
            tokio::time::sleep(think).await;
        }
        FlowStep::Request {
            name,
            latency_ms: (min, max),
            error_rate,
        } => {
            let (latency, failed) = {
                let mut rng = rand::thread_rng();
                (
                    rng.gen_range(*min..=*max),
                    rng.gen_bool(error_rate.clamp(0.0, 1.0)),
                )
            };

            let record = OperationRecord::new(name.clone());
            tokio::time::sleep(Duration::from_millis(latency)).await;

            let outcome = if failed {
                Err(SIMULATED_ERROR.to_string())
            } else {
                Ok(SIMULATED_OK)
            };
            shared.recorder.lock().record_operation(record, outcome);
        }
    }
}
