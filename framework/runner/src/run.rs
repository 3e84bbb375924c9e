use std::time::Duration;

use anyhow::{bail, Context};
use surge_core::prelude::{RunOptions, ShutdownHandle};
use surge_instruments::{ConsoleReporter, ReportCollector};

use crate::cli::SurgeCli;
use crate::coordinator::{Coordinator, CoordinatorEvent, WorkerLauncher};
use crate::monitor::start_monitor;
use crate::pool::PoolSize;
use crate::progress::start_progress;
use crate::script::{load_payload, load_script};
use crate::shutdown::start_shutdown_listener;
use crate::types::SurgeResult;

/// Run the load test described by the command line to completion, printing reports as they arrive.
///
/// Fails if the run could not be started or if any error was reported while it was running.
pub fn run(cli: SurgeCli) -> SurgeResult<()> {
    let script = load_script(&cli.script)?;
    let payload = match &cli.payload {
        Some(path) => load_payload(path)?,
        None => serde_json::Value::Null,
    };
    let pool_size = match cli.workers {
        Some(workers) => PoolSize::new(workers)?,
        None => PoolSize::from_env()?,
    };
    let launcher = match cli.worker_bin {
        Some(path) => WorkerLauncher::new(path),
        None => WorkerLauncher::locate()?,
    };
    let run_id = cli.run_id.unwrap_or_else(|| nanoid::nanoid!());
    let planned_runtime = Duration::from_secs(script.planned_duration_s());
    let show_progress = !cli.no_progress && !planned_runtime.is_zero();

    log::info!(
        "Running {} with {} worker(s) as run {run_id}",
        cli.script.display(),
        pool_size.get()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);

    let coordinator = Coordinator::new(
        script,
        payload,
        RunOptions {
            run_id: Some(run_id.clone()),
            environment: cli.environment,
        },
    )
    .with_pool_size(pool_size)
    .with_launcher(launcher)
    .with_shutdown_listener(shutdown_handle.new_listener());

    let errors = runtime.block_on(async move {
        let mut running = coordinator.run()?;

        // Stops the progress bar and the monitor once the run is over, however it ended.
        let finished = ShutdownHandle::new();
        if show_progress {
            start_progress(planned_runtime, finished.new_listener())?;
        }
        start_monitor(running.worker_ids().to_vec(), finished.new_listener())?;

        let mut reporter = ConsoleReporter::new();
        let mut errors = 0usize;
        while let Some(event) = running.next_event().await {
            match event {
                CoordinatorEvent::PhaseStarted(phase) => reporter.add_phase(&phase),
                CoordinatorEvent::Stats(report) => reporter.add_interval(&report),
                CoordinatorEvent::Done(report) => reporter.finalize(&report),
                CoordinatorEvent::Error(e) => {
                    log::debug!("Run error: {e:?}");
                    errors += 1;
                }
            }
        }
        finished.shutdown();

        SurgeResult::Ok(errors)
    })?;

    // Let the Ctrl-C task go, it would otherwise hold the runtime open.
    runtime.shutdown_background();

    if errors > 0 {
        bail!("Run {run_id} reported {errors} error(s)");
    }

    log::info!("Run {run_id} complete");
    Ok(())
}
