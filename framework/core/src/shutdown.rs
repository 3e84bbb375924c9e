use std::sync::Arc;

use tokio::sync::watch;

/// Signals a run to stop early.
///
/// Cloning the handle shares the same signal. Once [ShutdownHandle::shutdown] has been called every
/// listener, including ones created afterwards, observes the shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        if self.sender.send_replace(true) {
            log::trace!("Shutdown was already requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    pub fn new_listener(&self) -> DelegatedShutdownListener {
        DelegatedShutdownListener::new(self.sender.subscribe())
    }
}

#[derive(Clone, Debug)]
pub struct DelegatedShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: watch::Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been received.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal. Safe to race with other futures in a `select!`.
    ///
    /// If every [ShutdownHandle] is dropped without signalling then no shutdown can arrive and this
    /// future never completes.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
