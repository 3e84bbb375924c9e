use surge_core::prelude::Script;

use crate::pool::PoolSize;

/// Workers always report every second so that the coordinator decides the reporting cadence.
pub const WORKER_STATS_INTERVAL_S: u64 = 1;

/// Split a script into one script per worker.
///
/// Arrival rates are divided evenly. Arrival counts are split as evenly as whole virtual users allow,
/// with the remainder going to the first workers. A worker whose share of a phase is zero pauses for
/// the length of that phase instead, so that every worker runs the same sequence of phases.
pub fn divide_work(script: &Script, pool_size: PoolSize) -> Vec<Script> {
    let workers = pool_size.get();

    (0..workers)
        .map(|worker| {
            let mut worker_script = script.clone();
            worker_script.config.stats_interval = WORKER_STATS_INTERVAL_S;

            for phase in &mut worker_script.config.phases {
                phase.arrival_rate = phase.arrival_rate.map(|rate| rate / workers as f64);
                phase.ramp_to = phase.ramp_to.map(|rate| rate / workers as f64);

                if let Some(count) = phase.arrival_count {
                    let share = share_of(count, workers, worker);
                    if share == 0 {
                        phase.arrival_count = None;
                        phase.pause = Some(phase.duration);
                    } else {
                        phase.arrival_count = Some(share);
                    }
                }
            }

            worker_script
        })
        .collect()
}

fn share_of(total: u64, workers: usize, worker: usize) -> u64 {
    let workers = workers as u64;
    let worker = worker as u64;
    total / workers + u64::from(worker < total % workers)
}
