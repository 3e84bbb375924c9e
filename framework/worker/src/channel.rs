use anyhow::Context;
use surge_core::prelude::WorkerMessage;
use surge_instruments::StatsSnapshot;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::types::WorkerResult;

pub(crate) type Message = WorkerMessage<StatsSnapshot>;

/// Queues messages for the coordinator. Cheap to clone, one per task that reports something.
#[derive(Debug, Clone)]
pub(crate) struct MessageSender {
    sender: UnboundedSender<Message>,
}

impl MessageSender {
    pub(crate) fn send(&self, message: Message) {
        if self.sender.send(message).is_err() {
            log::warn!("Message writer has stopped, dropping message");
        }
    }
}

/// Start the task that writes messages to `output`, one JSON document per line.
///
/// The task ends once every [MessageSender] has been dropped and the queue is drained.
pub(crate) fn start_writer<W>(output: W) -> (MessageSender, JoinHandle<WorkerResult<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
    let handle = tokio::spawn(write_messages(output, receiver));

    (MessageSender { sender }, handle)
}

async fn write_messages<W>(mut output: W, mut receiver: UnboundedReceiver<Message>) -> WorkerResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = receiver.recv().await {
        let mut line = message
            .encode()
            .with_context(|| format!("Failed to serialize `{}` message", message.kind()))?;
        line.push('\n');

        output
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to the coordinator")?;
        // Each message must reach the coordinator as soon as it is produced.
        output.flush().await.context("Failed to flush output")?;
    }

    Ok(())
}
