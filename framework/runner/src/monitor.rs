use anyhow::Context;
use surge_core::prelude::{DelegatedShutdownListener, WorkerId};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::types::SurgeResult;

/// Share of a single core, in percent, above which a worker is considered saturated.
const SATURATED_CPU_PERCENT: f32 = 90.0;

/// Monitor the CPU usage of the worker processes and report workers that are saturated.
///
/// Note that this won't stop the test proceeding, it will just log a warning to let the user know
/// that a worker which cannot keep up will under-report throughput and over-report latency.
///
/// The CPU usage of each worker is sampled every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL]. Workers
/// that have exited are skipped.
pub(crate) fn start_monitor(
    workers: Vec<WorkerId>,
    shutdown_listener: DelegatedShutdownListener,
) -> SurgeResult<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let pids = workers
                .iter()
                .map(|worker| Pid::from_u32(worker.pid()))
                .collect::<Vec<_>>();
            let mut sys = System::new();

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Monitor thread shutting down");
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&pids),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                for (worker, pid) in workers.iter().zip(&pids) {
                    let Some(process) = sys.process(*pid) else {
                        continue;
                    };

                    let usage = process.cpu_usage();
                    if is_saturated(usage) {
                        log::warn!(
                            "High CPU usage detected. Worker {worker} is using {usage:.2}% of a core, results may be skewed"
                        );
                    }
                }

                std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            }
        })
        .context("Failed to start monitor thread")?;

    Ok(())
}

/// `cpu_usage` is relative to one core, so a busy multi-threaded worker can exceed 100.
fn is_saturated(cpu_usage: f32) -> bool {
    cpu_usage > SATURATED_CPU_PERCENT
}
