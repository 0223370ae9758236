use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use stampede_instruments::{RequestFailure, RequestOutcome};
use std::time::{Duration, Instant};
use url::Url;

/// An HTTP client bound to the base URL of the system under test.
///
/// Every request resolves to a [RequestOutcome]. Error statuses, transport errors and timeouts are
/// all reported through the outcome so that checks and metrics see them. The only errors returned
/// are for paths that cannot be joined to the base URL.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// Create a client that sends `headers` with every request. If `timeout` is set, requests that
    /// take longer are abandoned and reported as [RequestFailure::Timeout].
    pub fn new(
        base_url: &str,
        headers: &[(String, String)],
        timeout: Option<Duration>,
    ) -> anyhow::Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid base URL [{base_url}]"))?;

        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            default_headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("Invalid header name [{name}]"))?,
                HeaderValue::from_str(value)
                    .with_context(|| format!("Invalid value for header [{name}]"))?,
            );
        }

        let mut builder = Client::builder().default_headers(default_headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().context("Failed to build HTTP client")?,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL.
    pub fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Cannot join [{path}] to base URL [{}]", self.base_url))
    }

    /// Start building a request, to be sent with [HttpClient::send].
    pub fn request(&self, method: Method, path: &str) -> anyhow::Result<RequestBuilder> {
        Ok(self.client.request(method, self.url(path)?))
    }

    pub async fn get(&self, path: &str) -> anyhow::Result<RequestOutcome> {
        let request = self.request(Method::GET, path)?;
        Ok(self.send(request).await)
    }

    /// POST without a body, passing the input as query parameters.
    pub async fn post(&self, path: &str, query: &[(&str, &str)]) -> anyhow::Result<RequestOutcome> {
        let request = self.request(Method::POST, path)?.query(query);
        Ok(self.send(request).await)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> anyhow::Result<RequestOutcome> {
        let request = self.request(Method::POST, path)?.json(body);
        Ok(self.send(request).await)
    }

    /// Send a request and time it until the whole body has been received.
    pub async fn send(&self, request: RequestBuilder) -> RequestOutcome {
        let started = Instant::now();

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return failed(e, started.elapsed()),
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect::<Vec<_>>();

        match response.bytes().await {
            Ok(body) => {
                let elapsed = started.elapsed();
                log::trace!("Response {} in {:?}", status, elapsed);
                headers
                    .into_iter()
                    .fold(RequestOutcome::new(status, body, elapsed), |outcome, (name, value)| {
                        outcome.with_header(name, value)
                    })
            }
            Err(e) => failed(e, started.elapsed()),
        }
    }
}

fn failed(error: reqwest::Error, elapsed: Duration) -> RequestOutcome {
    let failure = if error.is_timeout() {
        RequestFailure::Timeout
    } else {
        // Keep the source chain, reqwest's own message rarely says what went wrong.
        RequestFailure::Transport(format!("{:#}", anyhow::Error::new(error)))
    };
    log::debug!("Request failed after {:?}: {}", elapsed, failure);

    RequestOutcome::failed(failure, elapsed)
}
