use anyhow::Context;
use http_stampede_runner::prelude::*;
use serde::Deserialize;
use std::time::Duration;

const SITES: [&str; 5] = [
    "https://www.google.com",
    "https://www.github.com",
    "https://www.youtube.com",
    "https://www.wikipedia.org",
    "https://www.amazon.com",
];

#[derive(Deserialize)]
struct QrCodeResponse {
    qr_code_url: Option<String>,
}

/// Step up by 60 virtual users every 90 seconds, holding each level for a minute, then ramp down.
fn stages() -> Vec<Stage> {
    let ramp = Duration::from_secs(30);
    let hold = Duration::from_secs(60);

    let mut stages = Vec::new();
    for target in [60, 120, 180, 240] {
        stages.push(Stage::new(ramp, target));
        stages.push(Stage::new(hold, target));
    }
    stages.push(Stage::new(ramp, 0));

    stages
}

fn generate_qr(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> ScenarioResult {
    let site = *pick_random(&SITES).context("No sites to pick from")?;
    log::debug!("VU {} testing with URL: {}", ctx.vu_id(), site);

    let outcome = send(ctx, |client| {
        Ok(client
            .request(Method::POST, "/generate-qr/")?
            .query(&[("url", site)])
            .header("Content-Type", "application/json"))
    })?;

    log::debug!("Response status: {}", outcome.status());
    log_unexpected_status(&outcome, 200);

    Ok(outcome)
}

fn has_qr_code(outcome: &RequestOutcome) -> anyhow::Result<bool> {
    let response: QrCodeResponse = outcome.json().context("Error parsing response")?;

    Ok(response
        .qr_code_url
        .is_some_and(|url| url.contains("s3.amazonaws.com")))
}

fn main() -> StampedeResult<()> {
    let builder = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(
        env!("CARGO_PKG_NAME"),
    )
    .with_default_base_url("http://127.0.0.1:8000")
    .with_stages(stages())
    .with_pacing(UniformPacing::new(Duration::ZERO, Duration::from_millis(500))?)
    .use_setup(configure_http_client)
    .use_check("status is 200", |r| Ok(r.status() == 200))
    .use_check("response has qr code", has_qr_code)
    .use_scenario(generate_qr);

    let summary = run(builder)?;
    if summary.is_failure() {
        anyhow::bail!("No virtual user completed an iteration");
    }

    Ok(())
}
