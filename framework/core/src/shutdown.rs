use tokio::sync::watch::{self, Receiver, Sender};

/// Sends a one-way stop signal to any number of listeners.
///
/// The same type is used for the global run shutdown (Ctrl-C, forced drain) and for retiring a
/// single virtual user. Once triggered the signal stays raised, so a listener that checks late
/// still sees it.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    sender: Sender<bool>,
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self {
            sender: watch::channel(false).0,
        }
    }

    pub fn shutdown(&self) {
        // `send_replace` succeeds even when nobody is subscribed yet.
        let was_shutdown = self.sender.send_replace(true);
        if was_shutdown {
            log::trace!("Shutdown signal was already sent");
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
    receiver: Receiver<bool>,
}

impl DelegatedShutdownListener {
    pub(crate) fn new(receiver: Receiver<bool>) -> Self {
        Self { receiver }
    }

    /// Point in time check if the shutdown signal has been raised. If this returns true then work
    /// should be stopped.
    ///
    /// Checking does not consume the signal, every later check also returns true.
    pub fn should_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait for the shutdown signal to be raised. It is safe to race this with another future so
    /// that the shutdown signal can be used to cancel other work in progress.
    ///
    /// Returns immediately if the signal was raised before this was called, or if the handle has
    /// been dropped.
    pub async fn wait_for_shutdown(&mut self) {
        if self.receiver.wait_for(|shutdown| *shutdown).await.is_err() {
            log::trace!("Shutdown handle dropped, treating as shutdown");
        }
    }
}

#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct ShutdownSignalError {
    msg: String,
}

impl Default for ShutdownSignalError {
    fn default() -> Self {
        Self {
            msg: "Execution cancelled by shutdown signal".to_string(),
        }
    }
}
