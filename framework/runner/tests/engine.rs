use std::time::{Duration, Instant};
use stampede_runner::prelude::{
    run, FixedPacing, RequestOutcome, RunStatus, ScenarioDefinitionBuilder, SetupError, Stage,
};

const VUS: usize = 8;
const ITERATIONS: u64 = 50;

fn plateau(name: &str, vus: usize) -> ScenarioDefinitionBuilder<(), ()> {
    ScenarioDefinitionBuilder::new(name)
        .with_stages(vec![
            Stage::new(Duration::from_millis(1), vus),
            Stage::new(Duration::from_secs(1), vus),
        ])
        .with_tick_interval(Duration::from_millis(10))
        .with_graceful_stop(Duration::from_secs(5))
        .with_no_progress()
        .with_no_summary_print()
}

#[test]
fn ramp_up_and_down_with_passing_checks() {
    let scenario = ScenarioDefinitionBuilder::<(), ()>::new("ramp_up_and_down_with_passing_checks")
        .with_stages(vec![
            Stage::new(Duration::from_millis(200), 10),
            Stage::new(Duration::from_millis(200), 0),
        ])
        .with_tick_interval(Duration::from_millis(10))
        .with_pacing(FixedPacing(Duration::from_millis(5)))
        .with_no_progress()
        .with_no_summary_print()
        .use_check("status is 200", |r| Ok(r.status() == 200))
        .use_scenario(|_| Ok(RequestOutcome::new(200, "ok", Duration::from_millis(1))));

    let summary = run(scenario).unwrap();

    assert_eq!(RunStatus::Completed, summary.status);
    assert!(summary.metrics.total_requests > 0);
    assert_eq!(0, summary.metrics.failed_requests);

    let check = &summary.metrics.checks["status is 200"];
    assert_eq!(1.0, check.pass_rate());
    assert_eq!(summary.metrics.total_requests, check.passes);

    assert!(summary.peak_vus > 0 && summary.peak_vus <= 10);
    assert_eq!(summary.vus_spawned, summary.vus_retired);
    assert_eq!(400, summary.planned_duration_ms);
}

#[test]
fn no_op_scenario_counts_every_iteration() {
    let scenario = plateau("no_op_scenario_counts_every_iteration", VUS)
        .with_max_iterations_per_vu(ITERATIONS)
        .use_scenario(|_| Ok(RequestOutcome::new(204, "", Duration::ZERO)));

    let summary = run(scenario).unwrap();

    let expected = VUS as u64 * ITERATIONS;
    assert_eq!(VUS, summary.vus_spawned);
    assert_eq!(expected, summary.metrics.total_requests);
    assert_eq!(expected, summary.metrics.completed_iterations);
    assert_eq!(expected as usize, summary.metrics.latency.count);
}

#[test]
fn always_failing_scenario_still_returns_a_summary() {
    let scenario = plateau("always_failing_scenario_still_returns_a_summary", VUS)
        .with_max_iterations_per_vu(ITERATIONS)
        .use_check("status is 200", |r| Ok(r.status() == 200))
        .use_scenario(|_| Err(anyhow::anyhow!("connection refused")));

    let summary = run(scenario).unwrap();

    let expected = VUS as u64 * ITERATIONS;
    assert_eq!(expected, summary.metrics.total_requests);
    assert_eq!(expected, summary.metrics.failed_requests);
    assert_eq!(expected, summary.metrics.scenario_errors);
    assert_eq!(0, summary.metrics.checks["status is 200"].passes);
    assert_eq!(RunStatus::NoCompletedIterations, summary.status);
}

#[test]
fn error_responses_fail_checks() {
    let scenario = plateau("error_responses_fail_checks", VUS)
        .with_max_iterations_per_vu(ITERATIONS)
        .use_check("status is 200", |r| Ok(r.status() == 200))
        .use_check("has body", |r| Ok(!r.text()?.is_empty()))
        .use_scenario(|_| Ok(RequestOutcome::new(500, "", Duration::from_millis(2))));

    let summary = run(scenario).unwrap();

    let expected = VUS as u64 * ITERATIONS;
    assert_eq!(expected, summary.metrics.failed_requests);
    assert_eq!(1.0, summary.metrics.error_rate());
    for check in summary.metrics.checks.values() {
        assert_eq!(0, check.passes);
        assert_eq!(expected, check.fails);
    }
    // The server answered, so these iterations completed.
    assert_eq!(RunStatus::Completed, summary.status);
    assert_eq!(2.0, summary.metrics.latency.p99_ms);
}

#[test]
fn empty_stage_list_is_a_setup_error() {
    let scenario = ScenarioDefinitionBuilder::<(), ()>::new("empty_stage_list_is_a_setup_error")
        .with_no_progress()
        .use_scenario(|_| Ok(RequestOutcome::new(200, "", Duration::ZERO)));

    let err = run(scenario).unwrap_err();

    assert_eq!(Some(&SetupError::NoStages), err.downcast_ref::<SetupError>());
}

#[test]
fn zero_target_stage_waits_out_its_duration() {
    let scenario = ScenarioDefinitionBuilder::<(), ()>::new("zero_target_stage_waits_out_its_duration")
        .with_stages(vec![Stage::new(Duration::from_millis(300), 0)])
        .with_tick_interval(Duration::from_millis(10))
        .with_no_progress()
        .with_no_summary_print()
        .use_scenario(|_| Ok(RequestOutcome::new(200, "", Duration::ZERO)));

    let summary = run(scenario).unwrap();

    assert!(summary.actual_duration_ms >= 300);
    assert_eq!(0, summary.vus_spawned);
    assert_eq!(RunStatus::NoCompletedIterations, summary.status);
}

#[test]
fn requests_still_running_after_the_graceful_stop_are_cancelled() {
    let scenario = plateau("requests_still_running_after_the_graceful_stop_are_cancelled", 2)
        .with_stages(vec![
            Stage::new(Duration::from_millis(1), 2),
            Stage::new(Duration::from_millis(300), 2),
        ])
        .with_graceful_stop(Duration::from_millis(100))
        .use_scenario(|ctx| {
            ctx.executor().execute_in_place(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(RequestOutcome::new(200, "", Duration::ZERO))
            })
        });

    let started = Instant::now();
    let summary = run(scenario).unwrap();

    assert!(started.elapsed() < Duration::from_secs(10), "{:?}", started.elapsed());
    assert_eq!(2, summary.vus_spawned);
    assert_eq!(2, summary.metrics.total_requests);
    assert_eq!(2, summary.metrics.timed_out_requests);
    assert_eq!(0, summary.metrics.completed_iterations);
    assert_eq!(RunStatus::NoCompletedIterations, summary.status);
}

#[test]
fn summary_is_appended_to_the_summary_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");

    for _ in 0..2 {
        let scenario = plateau("summary_is_appended_to_the_summary_file", 2)
            .with_max_iterations_per_vu(5)
            .with_summary_file(&path)
            .use_scenario(|_| Ok(RequestOutcome::new(200, "", Duration::ZERO)));
        run(scenario).unwrap();
    }

    let runs = stampede_summary_model::load_summary_runs(&path).unwrap();

    assert_eq!(2, runs.len());
    assert_ne!(runs[0].run_id, runs[1].run_id);
    for run in &runs {
        assert_eq!(10, run.metrics.total_requests);
        assert_eq!(RunStatus::Completed, run.status);
    }
}
