use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stampede_runner::prelude::{
    run, HookResult, RequestOutcome, RunnerContext, ScenarioDefinitionBuilder, Stage,
    UserValuesConstraint, VuContext,
};

#[derive(Default, Debug)]
struct RunnerContextValue {
    setup_ran: AtomicBool,
}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct VuContextValue {
    value: i32,
}

impl UserValuesConstraint for VuContextValue {}

fn short_scenario(name: &str) -> ScenarioDefinitionBuilder<RunnerContextValue, VuContextValue> {
    ScenarioDefinitionBuilder::new(name)
        .with_stages(vec![
            Stage::new(Duration::from_millis(100), 2),
            Stage::new(Duration::from_millis(400), 2),
        ])
        .with_tick_interval(Duration::from_millis(20))
        .with_graceful_stop(Duration::from_secs(5))
        .with_no_progress()
        .with_no_summary_print()
}

fn ok(_ctx: &mut VuContext<RunnerContextValue, VuContextValue>) -> anyhow::Result<RequestOutcome> {
    Ok(RequestOutcome::new(200, "", Duration::from_millis(1)))
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    let scenario = short_scenario("propagate_error_in_setup_hook")
        .use_scenario(ok)
        .use_setup(setup);

    let result = run(scenario);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn setup_values_are_visible_to_virtual_users() {
    fn setup(ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        ctx.get_mut().setup_ran.store(true, Ordering::SeqCst);
        Ok(())
    }

    let scenario = short_scenario("setup_values_are_visible_to_virtual_users")
        .use_setup(setup)
        .use_check("setup ran", |r| Ok(r.status() == 200))
        .use_scenario(|ctx| {
            let status = if ctx.runner_context().get().setup_ran.load(Ordering::SeqCst) {
                200
            } else {
                500
            };
            Ok(RequestOutcome::new(status, "", Duration::ZERO))
        });

    let summary = run(scenario).unwrap();

    let check = &summary.metrics.checks["setup ran"];
    assert!(check.passes > 0);
    assert_eq!(0, check.fails);
}

#[test]
fn capture_error_in_teardown_hook() {
    fn teardown(_ctx: Arc<RunnerContext<RunnerContextValue>>) -> HookResult {
        Err(anyhow::anyhow!("Error in teardown hook"))
    }

    let scenario = short_scenario("capture_error_in_teardown_hook")
        .use_scenario(ok)
        .use_teardown(teardown);

    let result = run(scenario);

    assert!(result.is_ok());
}

#[test]
fn capture_error_in_scenario_and_continue() {
    fn scenario_fn(
        ctx: &mut VuContext<RunnerContextValue, VuContextValue>,
    ) -> anyhow::Result<RequestOutcome> {
        ctx.get_mut().value += 1;
        if ctx.get().value % 2 == 0 {
            return Err(anyhow::anyhow!("Error in scenario"));
        }

        Ok(RequestOutcome::new(200, "", Duration::ZERO))
    }

    let scenario = short_scenario("capture_error_in_scenario_and_continue")
        .with_max_iterations_per_vu(4)
        .use_scenario(scenario_fn);

    let summary = run(scenario).unwrap();

    assert!(!summary.is_failure());
    assert_eq!(summary.metrics.total_requests, summary.metrics.scenario_errors * 2);
    assert_eq!(summary.metrics.completed_iterations, summary.metrics.scenario_errors);
}

#[test]
fn capture_panic_in_scenario_and_continue() {
    let scenario = short_scenario("capture_panic_in_scenario_and_continue")
        .with_max_iterations_per_vu(3)
        .use_scenario(|ctx| {
            if ctx.iteration() == 2 {
                panic!("Panic in scenario");
            }
            Ok(RequestOutcome::new(200, "", Duration::ZERO))
        });

    let summary = run(scenario).unwrap();

    assert_eq!(2, summary.vus_spawned);
    assert_eq!(6, summary.metrics.total_requests);
    assert_eq!(2, summary.metrics.scenario_errors);
    assert_eq!(4, summary.metrics.completed_iterations);
}

#[test]
fn request_timeout_is_recorded_and_the_run_finishes() {
    let scenario = short_scenario("request_timeout_is_recorded_and_the_run_finishes")
        .with_request_timeout(Duration::from_millis(20))
        .with_max_iterations_per_vu(2)
        .use_scenario(|ctx| {
            ctx.executor().execute_in_place(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RequestOutcome::new(200, "", Duration::ZERO))
            })
        });

    let summary = run(scenario).unwrap();

    assert_eq!(4, summary.metrics.timed_out_requests);
    assert_eq!(4, summary.metrics.failed_requests);
    assert_eq!(0, summary.metrics.latency.count);
    assert!(summary.is_failure());
}

#[test]
fn force_stop_ends_the_run_early() {
    let scenario = ScenarioDefinitionBuilder::<RunnerContextValue, VuContextValue>::new(
        "force_stop_ends_the_run_early",
    )
    .with_stages(vec![
        Stage::new(Duration::from_millis(1), 1),
        Stage::new(Duration::from_secs(600), 1),
    ])
    .with_tick_interval(Duration::from_millis(20))
    .with_no_progress()
    .with_no_summary_print()
    .use_scenario(|ctx| {
        if ctx.iteration() >= 5 {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_scenario();
        }
        Ok(RequestOutcome::new(200, "", Duration::ZERO))
    });

    let summary = run(scenario).unwrap();

    assert!(summary.actual_duration_ms < 60_000);
    assert!(summary.metrics.total_requests >= 5);
}
