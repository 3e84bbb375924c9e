mod protocol;
mod script;
mod shutdown;

pub mod prelude {
    pub use crate::protocol::{
        Decoded, Phase, ProtocolViolation, RunOptions, RunOpts, WorkerCommand, WorkerId,
        WorkerMessage,
    };
    pub use crate::script::{
        FlowStep, InvalidScript, PhaseSpec, ScenarioSpec, Script, ScriptConfig,
        DEFAULT_STATS_INTERVAL_S,
    };
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle};
}
