use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_instruments::{print_summary, MetricsCollector};
use stampede_summary_model::{append_run_summary, RunSummary};

use crate::context::{RunnerContext, UserValuesConstraint};
use crate::definition::ScenarioDefinitionBuilder;
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::progress::start_progress;
use crate::scheduler::{StageScheduler, VuPool};
use crate::shutdown::start_shutdown_listener;
use crate::vu::{ThreadVuPool, VuShared};

/// Run a scenario through all of its stages and return the summary.
///
/// Only setup problems are returned as errors: an invalid definition, or a failing setup hook.
/// Failed iterations are recorded in the summary. A run where no virtual user completed an
/// iteration still returns its summary, with [stampede_summary_model::RunStatus::NoCompletedIterations].
///
/// This blocks the calling thread until the run is over and must not be called from inside a
/// Tokio runtime.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunSummary> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario: {} with {} stages over {:?}",
        definition.name,
        definition.plan.stages().len(),
        definition.plan.total_duration()
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let executor = Arc::new(Executor::new(
        runtime,
        shutdown_handle.clone(),
        definition.config.request_timeout,
    ));

    let metrics = Arc::new(MetricsCollector::new());
    for name in definition.checks.names() {
        metrics.register_check(name);
    }

    let run_id = nanoid::nanoid!();
    let mut runner_context = RunnerContext::new(
        executor.clone(),
        metrics.clone(),
        shutdown_handle.clone(),
        definition.config.clone(),
        run_id.clone(),
    );

    if let Some(setup_fn) = definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    let runner_context = Arc::new(runner_context);
    let planned_duration = definition.plan.total_duration();
    let running_vus = Arc::new(AtomicUsize::new(0));

    if !definition.no_progress {
        if let Err(e) = start_progress(
            planned_duration,
            running_vus.clone(),
            shutdown_handle.new_listener(),
        ) {
            log::warn!("Could not start the progress bar: {e:?}");
        }
    }

    // Report high usage by the load generator itself, which might lead to a misleading outcome.
    if let Err(e) = start_monitor(shutdown_handle.new_listener()) {
        log::warn!("Could not start the resource monitor: {e:?}");
    }

    let mut summary = RunSummary::new(
        run_id,
        definition.name.clone(),
        chrono::Utc::now().timestamp(),
        planned_duration,
        env!("CARGO_PKG_VERSION").to_string(),
    );

    let mut scheduler = StageScheduler::new(definition.plan.clone());
    let mut pool = ThreadVuPool::new(VuShared {
        runner_context: runner_context.clone(),
        scenario: definition.scenario.clone(),
        checks: Arc::new(definition.checks.clone()),
        pacing: definition.pacing.clone(),
        max_iterations: definition.max_iterations_per_vu,
        shutdown_handle: shutdown_handle.clone(),
        running: running_vus,
    });

    let start = Instant::now();
    let mut last_sample = start;
    loop {
        let elapsed = start.elapsed();

        if let Err(e) = scheduler.reconcile(elapsed, &mut pool) {
            log::error!("Stopping the run early: {e:?}");
            break;
        }
        pool.reap();

        if let Some(interval) = definition.summary_interval {
            if last_sample.elapsed() >= interval {
                log_sample(&metrics, pool.live());
                last_sample = Instant::now();
            }
        }

        if scheduler.plan().is_finished(elapsed) {
            break;
        }

        let tick = scheduler.next_tick(elapsed, definition.tick_interval);
        if !executor.sleep_unless_shutdown(tick.max(Duration::from_millis(1))) {
            log::info!("Run was stopped after {:?}", start.elapsed());
            break;
        }
    }

    scheduler.stop_all(&mut pool);
    pool.drain(definition.graceful_stop);

    if let Some(teardown_fn) = definition.teardown_fn {
        // Don't crash the runner if the teardown fails. We still want the reporting and runner
        // shutdown to happen cleanly. The hook is documented as 'best effort'
        if let Err(e) = teardown_fn(runner_context.clone()) {
            log::error!("Teardown failed: {:?}", e);
        }
    }

    // Stops the progress bar and the resource monitor.
    shutdown_handle.shutdown();

    summary.set_vu_counts(scheduler.peak(), scheduler.spawned(), scheduler.retired());
    summary.finish(start.elapsed(), metrics.snapshot());

    if summary.is_failure() {
        log::error!(
            "Run {} failed, no virtual user completed an iteration",
            summary.run_id
        );
    }

    if definition.print_summary {
        print_summary(&summary);
    }

    if let Some(path) = &definition.summary_file {
        if let Err(e) = append_run_summary(&summary, path) {
            log::error!("Failed to write the run summary to {}: {:?}", path.display(), e);
        }
    }

    Ok(summary)
}

fn log_sample(metrics: &MetricsCollector, live_vus: usize) {
    let snapshot = metrics.snapshot();
    log::info!(
        "{} VUs live, {} requests, {:.2}% errors",
        live_vus,
        snapshot.total_requests,
        snapshot.error_rate() * 100.0
    );
}
