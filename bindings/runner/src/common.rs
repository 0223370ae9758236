use crate::context::HttpVuContext;
use crate::runner_context::HttpRunnerContext;
use anyhow::Context;
use rand::seq::SliceRandom;
use stampede_http_client::prelude::{HttpClient, Method};
use stampede_runner::prelude::{
    HookResult, RequestOutcome, RunnerContext, ScenarioResult, UserValuesConstraint, VuContext,
};

/// Creates the [HttpClient] in [HttpRunnerContext] from the run configuration.
///
/// Use this as the setup hook, or call it from your own setup hook:
/// ```rust
/// use http_stampede_runner::prelude::*;
///
/// let builder = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new("example")
///     .with_default_base_url("http://127.0.0.1:8000")
///     .use_setup(configure_http_client);
/// ```
///
/// The client uses the base URL (`--base-url` or the scenario default), the configured default
/// headers and the request timeout.
pub fn configure_http_client(ctx: &mut RunnerContext<HttpRunnerContext>) -> HookResult {
    let base_url = ctx
        .base_url()
        .context("No base URL configured, pass `--base-url` or set a default on the scenario")?
        .to_string();

    log::debug!("Configuring HTTP client for {}", base_url);
    let client = HttpClient::new(&base_url, ctx.headers(), ctx.request_timeout())?;
    ctx.get_mut().set_client(client);

    Ok(())
}

/// GET `path` from the system under test.
pub fn get<SV: UserValuesConstraint>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    path: &str,
) -> ScenarioResult {
    let client = ctx.runner_context().get().client()?.clone();
    let path = path.to_string();
    ctx.executor()
        .execute_in_place(async move { client.get(&path).await })
}

/// POST to `path` with no body and the given query parameters.
pub fn post<SV: UserValuesConstraint>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    path: &str,
    query: &[(&str, &str)],
) -> ScenarioResult {
    let client = ctx.runner_context().get().client()?.clone();
    let request = client.request(Method::POST, path)?.query(query);
    ctx.executor()
        .execute_in_place(async move { Ok(client.send(request).await) })
}

/// Send a custom request, built from the shared client.
///
/// ```rust,no_run
/// use http_stampede_runner::prelude::*;
///
/// fn scenario(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> ScenarioResult {
///     send(ctx, |client| {
///         Ok(client
///             .request(Method::PUT, "/items/1")?
///             .header("Content-Type", "application/json")
///             .body("{}"))
///     })
/// }
/// ```
pub fn send<SV, F>(
    ctx: &mut VuContext<HttpRunnerContext, HttpVuContext<SV>>,
    build: F,
) -> ScenarioResult
where
    SV: UserValuesConstraint,
    F: FnOnce(&HttpClient) -> anyhow::Result<stampede_http_client::prelude::RequestBuilder>,
{
    let client = ctx.runner_context().get().client()?.clone();
    let request = build(&client)?;
    ctx.executor()
        .execute_in_place(async move { Ok(client.send(request).await) })
}

/// Pick a random item, for example the input for the next request. Returns `None` if `items` is
/// empty.
pub fn pick_random<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::thread_rng())
}

/// Log the body of a response at debug level if it does not have the expected status.
pub fn log_unexpected_status(outcome: &RequestOutcome, expected: u16) {
    if outcome.status() != expected {
        log::debug!(
            "Unexpected response status {} (expected {}), body: {}",
            outcome.status(),
            expected,
            String::from_utf8_lossy(outcome.body())
        );
    }
}
