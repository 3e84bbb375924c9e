use anyhow::Context;
use surge_core::prelude::WorkerId;
use surge_worker::prelude::{serve, WorkerResult};

fn main() -> WorkerResult<()> {
    // Logs go to stderr, stdout is reserved for protocol messages.
    env_logger::init();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        WorkerId::new(std::process::id()),
    ))
}
