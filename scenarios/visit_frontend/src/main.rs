use http_stampede_runner::prelude::*;
use std::time::Duration;

fn visit(ctx: &mut VuContext<HttpRunnerContext, HttpVuContext>) -> ScenarioResult {
    get(ctx, "/")
}

fn main() -> StampedeResult<()> {
    let builder = ScenarioDefinitionBuilder::<HttpRunnerContext, HttpVuContext>::new_with_init(
        env!("CARGO_PKG_NAME"),
    )
    .with_default_base_url("http://127.0.0.1:51144")
    .with_stages(vec![
        Stage::new(Duration::from_secs(30), 60),
        Stage::new(Duration::from_secs(60), 120),
        Stage::new(Duration::from_secs(30), 180),
    ])
    .with_pacing(UniformPacing::new(Duration::ZERO, Duration::from_millis(500))?)
    .use_setup(configure_http_client)
    .use_check("frontend loaded", |r| Ok(r.status() == 200))
    .use_scenario(visit);

    let summary = run(builder)?;
    if summary.is_failure() {
        anyhow::bail!("No virtual user completed an iteration");
    }

    Ok(())
}
