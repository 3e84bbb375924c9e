mod cli;
mod coordinator;
mod distribute;
mod init;
mod monitor;
mod pool;
mod progress;
mod run;
mod script;
mod shutdown;
mod types;
mod worker_bin;

pub mod prelude {
    pub use crate::cli::SurgeCli;
    pub use crate::coordinator::{
        Coordinator, CoordinatorError, CoordinatorEvent, RunningCoordinator, WorkerLauncher,
    };
    pub use crate::distribute::{divide_work, WORKER_STATS_INTERVAL_S};
    pub use crate::init::init;
    pub use crate::pool::{PoolSize, POOL_SIZE_ENV};
    pub use crate::run::run;
    pub use crate::script::{load_payload, load_script};
    pub use crate::types::SurgeResult;
    pub use crate::worker_bin::{worker_path, SURGE_WORKER_PATH_ENV};
}
