use anyhow::{bail, Context};
use surge_core::prelude::{WorkerCommand, WorkerId};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};

use crate::channel::start_writer;
use crate::executor::execute;
use crate::types::WorkerResult;

/// Serve one run for the coordinator.
///
/// Waits for the run command on `input`, executes it while reporting on `output` and then keeps
/// reading `input` until it is closed. The coordinator normally kills the worker once it has seen
/// `done`, so returning is the fallback for a coordinator that went away.
pub async fn serve<R, W>(input: R, output: W, pid: WorkerId) -> WorkerResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(input).lines();

    let command = loop {
        let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read from the coordinator")?
        else {
            bail!("Input closed before a run command was received");
        };
        if line.trim().is_empty() {
            continue;
        }

        break WorkerCommand::decode(&line).context("Invalid command from the coordinator")?;
    };

    let WorkerCommand::Run { opts } = command;
    opts.script.validate()?;
    log::info!(
        "Worker {pid} running {} phase(s){}",
        opts.script.config.phases.len(),
        opts.options
            .run_id
            .as_deref()
            .map(|id| format!(" for run {id}"))
            .unwrap_or_default()
    );

    let (messages, writer) = start_writer(output);
    execute(opts.script, pid, messages).await?;
    writer.await.context("Message writer panicked")??;

    log::debug!("Run finished, waiting to be stopped");
    while lines
        .next_line()
        .await
        .context("Failed to read from the coordinator")?
        .is_some()
    {}

    Ok(())
}
