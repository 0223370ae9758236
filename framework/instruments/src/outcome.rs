use anyhow::Context;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Why a request did not produce a usable response.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RequestFailure {
    #[display("request timed out")]
    Timeout,
    #[display("transport error: {_0}")]
    Transport(String),
}

/// The result of one request made by a scenario.
///
/// A status of `0` means that no response was received, in which case [RequestOutcome::error]
/// explains why.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    elapsed: Duration,
    error: Option<RequestFailure>,
}

impl RequestOutcome {
    pub fn new(status: u16, body: impl Into<Bytes>, elapsed: Duration) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
            elapsed,
            error: None,
        }
    }

    /// An outcome for a request that never got a response.
    pub fn failed(error: RequestFailure, elapsed: Duration) -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: Bytes::new(),
            elapsed,
            error: Some(error),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn error(&self) -> Option<&RequestFailure> {
        self.error.as_ref()
    }

    /// Case-insensitive header lookup, returning the first match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.error, Some(RequestFailure::Timeout))
    }

    /// A request failed if it got no response or the response status was 400 or above.
    pub fn is_failure(&self) -> bool {
        self.error.is_some() || self.status >= 400
    }

    pub fn text(&self) -> anyhow::Result<&str> {
        std::str::from_utf8(&self.body).context("Response body is not valid UTF-8")
    }

    pub fn json<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_slice(&self.body).context("Response body is not valid JSON")
    }
}
