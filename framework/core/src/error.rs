use std::any::Any;
use std::time::Duration;

/// Returned when an in-flight request does not complete within the configured request timeout.
///
/// The iteration that hit the timeout is recorded as a timed out request and the virtual user moves
/// on to its next iteration.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, Copy, PartialEq, Eq)]
#[display("Request did not complete within the timeout of {timeout:?}")]
pub struct TimeoutError {
    timeout: Duration,
}

impl TimeoutError {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A panic caught while running scenario or check code, converted to an error so that it can be
/// recorded like any other failure.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone)]
#[display("Panicked: {msg}")]
pub struct ScenarioPanicError {
    msg: String,
}

impl ScenarioPanicError {
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&'static str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Self { msg }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}
