use std::future::Future;
use std::time::Duration;

use stampede_core::prelude::{
    DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError, TimeoutError,
};

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
    shutdown_handle: ShutdownHandle,
    request_timeout: Option<Duration>,
}

impl Executor {
    pub(crate) fn new(
        runtime: tokio::runtime::Runtime,
        shutdown_handle: ShutdownHandle,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            runtime,
            shutdown_handle,
            request_timeout,
        }
    }

    /// Run async code in place, blocking the calling virtual user until it completes.
    ///
    /// If a request timeout is configured for the run and the future takes longer than that, it is
    /// dropped and a [TimeoutError] is returned. The future is also cancelled, with a
    /// [ShutdownSignalError], if the run is shut down. You do not need to handle either error in
    /// your scenario, return it and the runner records it as a timed out request.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        let request_timeout = self.request_timeout;
        self.runtime.block_on(async move {
            let bounded = async move {
                match request_timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(TimeoutError::new(timeout).into()),
                    },
                    None => fut.await,
                }
            };

            tokio::select! {
                result = bounded => result,
                _ = shutdown_listener.wait_for_shutdown() => {
                    Err(ShutdownSignalError::default().into())
                },
            }
        })
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Sleep for `duration` unless the run is shut down first. Returns false if the sleep was
    /// interrupted by shutdown.
    pub(crate) fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = shutdown_listener.wait_for_shutdown() => false,
            }
        })
    }

    /// Sleep between iterations of a virtual user. Wakes early if the virtual user is retired or
    /// the run is shut down.
    pub(crate) fn pace(&self, delay: Duration, retire_listener: &mut DelegatedShutdownListener) {
        let mut shutdown_listener = self.shutdown_handle.new_listener();
        self.runtime.block_on(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = retire_listener.wait_for_shutdown() => {},
                _ = shutdown_listener.wait_for_shutdown() => {},
            }
        })
    }
}
