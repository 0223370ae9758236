use anyhow::Context;
use stampede_http_client::prelude::HttpClient;
use stampede_runner::prelude::UserValuesConstraint;

#[derive(Default, Debug)]
pub struct HttpRunnerContext {
    client: Option<HttpClient>,
}

impl UserValuesConstraint for HttpRunnerContext {}

impl HttpRunnerContext {
    pub fn set_client(&mut self, client: HttpClient) {
        self.client = Some(client);
    }

    /// The client shared by all virtual users. Set by [crate::prelude::configure_http_client].
    pub fn client(&self) -> anyhow::Result<&HttpClient> {
        self.client
            .as_ref()
            .context("HTTP client is not configured, use `configure_http_client` as the setup hook")
    }
}
