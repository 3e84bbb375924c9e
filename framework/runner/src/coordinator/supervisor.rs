//! Spawns worker processes and connects them to the coordinator.
//!
//! Each worker gets a task that owns its [Child] process. The task writes [WorkerCommand]s to the
//! worker's stdin, forwards every line the worker writes to stdout onto the shared inbound channel
//! and reports when the process exits. Lines from one worker arrive in the order they were written.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context};
use surge_core::prelude::{WorkerCommand, WorkerId};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::types::SurgeResult;
use crate::worker_bin::worker_path;

/// How long a worker may keep running after closing its stdout before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Describes how to start a worker process.
#[derive(Debug, Clone)]
pub struct WorkerLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
    exit_grace: Duration,
}

impl WorkerLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            exit_grace: EXIT_GRACE,
        }
    }

    /// Use the `surge-worker` binary found by [worker_path].
    pub fn locate() -> SurgeResult<Self> {
        Ok(Self::new(worker_path()?))
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Override how long a worker that closed its stdout may keep running before it is killed.
    pub fn with_exit_grace(mut self, exit_grace: Duration) -> Self {
        self.exit_grace = exit_grace;
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        command
    }
}

/// What a worker task delivers to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    Line(String),
    /// The process exited on its own, with a description of its exit status.
    Exited(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FromWorker {
    pub(crate) worker: WorkerId,
    pub(crate) inbound: Inbound,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum WorkerControl {
    Command(WorkerCommand),
    /// Kill the process. No further messages are read from it.
    Terminate,
}

#[derive(Debug)]
pub(crate) struct WorkerHandle {
    id: WorkerId,
    control: UnboundedSender<WorkerControl>,
    is_done: bool,
}

impl WorkerHandle {
    pub(crate) fn new(id: WorkerId, control: UnboundedSender<WorkerControl>) -> Self {
        Self {
            id,
            control,
            is_done: false,
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn is_done(&self) -> bool {
        self.is_done
    }

    /// Returns false if the worker was already done.
    pub(crate) fn mark_done(&mut self) -> bool {
        !std::mem::replace(&mut self.is_done, true)
    }

    pub(crate) fn send(&self, command: WorkerCommand) -> SurgeResult<()> {
        self.control
            .send(WorkerControl::Command(command))
            .with_context(|| format!("Worker {} is no longer running", self.id))
    }

    pub(crate) fn terminate(&self) {
        if self.control.send(WorkerControl::Terminate).is_err() {
            log::trace!("Worker {} already stopped", self.id);
        }
    }
}

/// The live workers of one run, keyed by process id.
#[derive(Debug, Default)]
pub(crate) struct WorkerPool {
    workers: BTreeMap<WorkerId, WorkerHandle>,
}

impl WorkerPool {
    pub(crate) fn insert(&mut self, handle: WorkerHandle) -> SurgeResult<()> {
        let id = handle.id();
        if self.workers.contains_key(&id) {
            bail!("A worker with process id {id} is already registered");
        }
        self.workers.insert(id, handle);
        Ok(())
    }

    pub(crate) fn get(&self, id: WorkerId) -> Option<&WorkerHandle> {
        self.workers.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: WorkerId) -> Option<&mut WorkerHandle> {
        self.workers.get_mut(&id)
    }

    pub(crate) fn ids(&self) -> Vec<WorkerId> {
        self.workers.keys().copied().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.workers.len()
    }

    /// Workers that have not reported done yet.
    pub(crate) fn remaining(&self) -> usize {
        self.workers.values().filter(|w| !w.is_done()).count()
    }

    pub(crate) fn terminate_all(&self) {
        self.workers.values().for_each(WorkerHandle::terminate);
    }
}

/// Start a worker process and the task that drives it.
pub(crate) fn spawn_worker(
    launcher: &WorkerLauncher,
    inbound: UnboundedSender<FromWorker>,
) -> SurgeResult<WorkerHandle> {
    let mut child = launcher.command().spawn().with_context(|| {
        format!(
            "Failed to spawn worker process '{}'",
            launcher.program.display()
        )
    })?;

    let id = WorkerId::new(
        child
            .id()
            .context("Worker process exited before it could be registered")?,
    );
    let stdin = child
        .stdin
        .take()
        .context("Failed to get stdin for the worker process")?;
    let stdout = child
        .stdout
        .take()
        .context("Failed to get stdout for the worker process")?;

    let (control, control_receiver) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(drive_worker(
        id,
        launcher.exit_grace,
        child,
        stdin,
        stdout,
        control_receiver,
        inbound,
    ));

    log::debug!("Spawned worker {id}");
    Ok(WorkerHandle::new(id, control))
}

async fn drive_worker(
    id: WorkerId,
    exit_grace: Duration,
    mut child: Child,
    mut stdin: ChildStdin,
    stdout: ChildStdout,
    mut control: UnboundedReceiver<WorkerControl>,
    inbound: UnboundedSender<FromWorker>,
) {
    let mut lines = BufReader::new(stdout).lines();

    // Relay until the worker closes stdout or is told to stop.
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let message = FromWorker { worker: id, inbound: Inbound::Line(line) };
                    if inbound.send(message).is_err() {
                        kill(id, &mut child).await;
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::warn!("Failed to read output of worker {id}: {e}");
                    break;
                }
            },
            control_message = control.recv() => match control_message {
                Some(WorkerControl::Command(command)) => {
                    if let Err(e) = write_command(&mut stdin, &command).await {
                        log::warn!("Failed to send command to worker {id}: {e:?}");
                    }
                }
                Some(WorkerControl::Terminate) | None => {
                    kill(id, &mut child).await;
                    return;
                }
            },
        }
    }

    // Stdout is closed, wait for the process to go away unless we are told to stop it first.
    // A worker still running once `exit_grace` has passed is killed and reported as exited.
    let grace = tokio::time::sleep(exit_grace);
    tokio::pin!(grace);
    let status = loop {
        tokio::select! {
            status = child.wait() => break match status {
                Ok(status) => status.to_string(),
                Err(e) => format!("unknown exit status: {e}"),
            },
            () = &mut grace => {
                log::warn!("Worker {id} closed its output but is still running, stopping it");
                kill(id, &mut child).await;
                break "closed its output but kept running".to_string();
            }
            control_message = control.recv() => match control_message {
                Some(WorkerControl::Command(_)) => {
                    log::debug!("Worker {id} closed its output, dropping command");
                }
                Some(WorkerControl::Terminate) | None => {
                    kill(id, &mut child).await;
                    return;
                }
            },
        }
    };
    log::debug!("Worker {id} exited: {status}");

    let message = FromWorker {
        worker: id,
        inbound: Inbound::Exited(status),
    };
    if inbound.send(message).is_err() {
        log::trace!("Coordinator stopped before worker {id} exited");
    }
}

async fn write_command(stdin: &mut ChildStdin, command: &WorkerCommand) -> SurgeResult<()> {
    let mut line = command
        .encode()
        .context("Failed to serialize worker command")?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

async fn kill(id: WorkerId, child: &mut Child) {
    match child.kill().await {
        Ok(()) => log::debug!("Stopped worker {id}"),
        Err(e) => log::warn!("Failed to stop worker {id}: {e}"),
    }
}
