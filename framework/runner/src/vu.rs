use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::Context;
use stampede_core::prelude::{
    DelegatedShutdownListener, ScenarioPanicError, ShutdownHandle, ShutdownSignalError,
    TimeoutError,
};
use stampede_instruments::{Checks, MetricsCollector};

use crate::context::{RunnerContext, UserValuesConstraint, VuContext};
use crate::definition::ScenarioFn;
use crate::pacing::PacingPolicy;
use crate::scheduler::VuPool;

/// How long to wait for virtual users to notice the global shutdown once the graceful stop window
/// has passed.
const FORCED_STOP_GRACE: Duration = Duration::from_secs(2);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything a virtual user thread needs, shared by all of them.
pub(crate) struct VuShared<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) runner_context: Arc<RunnerContext<RV>>,
    pub(crate) scenario: ScenarioFn<RV, V>,
    pub(crate) checks: Arc<Checks>,
    pub(crate) pacing: Arc<dyn PacingPolicy>,
    pub(crate) max_iterations: Option<u64>,
    pub(crate) shutdown_handle: ShutdownHandle,
    /// The number of virtual user threads currently running.
    pub(crate) running: Arc<AtomicUsize>,
}

struct VuHandle {
    vu_id: usize,
    retire: ShutdownHandle,
    thread: JoinHandle<()>,
}

/// A [VuPool] that runs every virtual user on its own OS thread.
pub(crate) struct ThreadVuPool<RV: UserValuesConstraint, V: UserValuesConstraint> {
    shared: Arc<VuShared<RV, V>>,
    next_vu_id: usize,
    live: Vec<VuHandle>,
    draining: Vec<VuHandle>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ThreadVuPool<RV, V> {
    pub(crate) fn new(shared: VuShared<RV, V>) -> Self {
        Self {
            shared: Arc::new(shared),
            next_vu_id: 1,
            live: Vec::new(),
            draining: Vec::new(),
        }
    }

    /// Join the threads of retired virtual users that have finished their last iteration.
    pub(crate) fn reap(&mut self) {
        let (finished, draining) = std::mem::take(&mut self.draining)
            .into_iter()
            .partition::<Vec<_>, _>(|h| h.thread.is_finished());
        self.draining = draining;

        for handle in finished {
            join(handle);
        }
    }

    /// The number of retired virtual users that are still finishing their last iteration.
    pub(crate) fn draining(&self) -> usize {
        self.draining.len()
    }

    /// Wait for every retired virtual user to stop.
    ///
    /// Virtual users get `graceful_stop` to finish their current iteration. After that the global
    /// shutdown is raised, which cancels in-flight requests. Any thread still running a short while
    /// later is left behind so the run can finish.
    pub(crate) fn drain(&mut self, graceful_stop: Duration) {
        debug_assert!(self.live.is_empty(), "drain called with live VUs");

        if !self.wait_for_draining(Instant::now() + graceful_stop) {
            log::warn!(
                "{} VUs did not stop within the graceful stop window of {:?}, cancelling in-flight requests",
                self.draining.len(),
                graceful_stop
            );
            self.shared.shutdown_handle.shutdown();

            if !self.wait_for_draining(Instant::now() + FORCED_STOP_GRACE) {
                for handle in self.draining.drain(..) {
                    log::warn!("VU {} did not stop, abandoning its thread", handle.vu_id);
                }
            }
        }
    }

    fn wait_for_draining(&mut self, deadline: Instant) -> bool {
        loop {
            self.reap();
            if self.draining.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(JOIN_POLL_INTERVAL);
        }
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuPool for ThreadVuPool<RV, V> {
    fn spawn(&mut self) -> anyhow::Result<()> {
        let vu_id = self.next_vu_id;
        self.next_vu_id += 1;

        let retire = ShutdownHandle::new();
        let shared = self.shared.clone();
        // One listener for the loop, one the scenario can use through its context.
        let loop_listener = retire.new_listener();
        let context_listener = retire.new_listener();

        shared.running.fetch_add(1, Ordering::SeqCst);
        let thread = std::thread::Builder::new()
            .name(format!("vu-{vu_id}"))
            .spawn(move || {
                run_vu(vu_id, &shared, loop_listener, context_listener);
                shared.running.fetch_sub(1, Ordering::SeqCst);
            });

        let thread = match thread {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.running.fetch_sub(1, Ordering::SeqCst);
                return Err(e).with_context(|| format!("Failed to spawn thread for VU {vu_id}"));
            }
        };

        self.live.push(VuHandle {
            vu_id,
            retire,
            thread,
        });

        Ok(())
    }

    fn retire(&mut self) {
        if let Some(handle) = self.live.pop() {
            log::debug!("Retiring VU {}", handle.vu_id);
            handle.retire.shutdown();
            self.draining.push(handle);
        }
    }

    fn live(&self) -> usize {
        self.live.len()
    }
}

fn join(handle: VuHandle) {
    if let Err(e) = handle.thread.join() {
        log::error!(
            "VU {} thread panicked: {}",
            handle.vu_id,
            ScenarioPanicError::from_payload(e)
        );
    }
}

fn run_vu<RV: UserValuesConstraint, V: UserValuesConstraint>(
    vu_id: usize,
    shared: &VuShared<RV, V>,
    mut retire_listener: DelegatedShutdownListener,
    context_listener: DelegatedShutdownListener,
) {
    log::debug!("Starting VU {}", vu_id);

    let shutdown_listener = shared.shutdown_handle.new_listener();
    let metrics: &MetricsCollector = shared.runner_context.metrics();
    let executor = shared.runner_context.executor().clone();
    let mut context = VuContext::new(vu_id, shared.runner_context.clone(), context_listener);

    loop {
        if retire_listener.should_shutdown() || shutdown_listener.should_shutdown() {
            log::debug!("Stopping VU {}", vu_id);
            break;
        }

        let iteration = context.next_iteration();

        match std::panic::catch_unwind(AssertUnwindSafe(|| (shared.scenario)(&mut context))) {
            Ok(Ok(outcome)) => {
                metrics.record_outcome(vu_id, &outcome);
                shared.checks.evaluate(&outcome, metrics);
            }
            Ok(Err(e)) if e.is::<TimeoutError>() => {
                log::warn!("VU {} iteration {} timed out: {}", vu_id, iteration, e);
                metrics.record_timeout();
            }
            Ok(Err(e)) if e.is::<ShutdownSignalError>() => {
                log::debug!("VU {} iteration {} was cancelled by shutdown", vu_id, iteration);
                metrics.record_timeout();
            }
            Ok(Err(e)) => {
                log::error!("VU {} iteration {} failed: {:?}", vu_id, iteration, e);
                metrics.record_scenario_error();
            }
            Err(payload) => {
                log::error!(
                    "VU {} iteration {} failed: {}",
                    vu_id,
                    iteration,
                    ScenarioPanicError::from_payload(payload)
                );
                metrics.record_scenario_error();
            }
        }

        if shared.max_iterations.is_some_and(|max| iteration >= max) {
            log::debug!("VU {} completed its {} iterations", vu_id, iteration);
            break;
        }

        let delay = shared.pacing.next_delay();
        if !delay.is_zero() {
            executor.pace(delay, &mut retire_listener);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunConfig;
    use crate::definition::ScenarioResult;
    use crate::executor::Executor;
    use crate::pacing::{FixedPacing, NoPacing};
    use stampede_instruments::{Check, RequestOutcome};

    fn shared(
        scenario: ScenarioFn<(), ()>,
        pacing: Arc<dyn PacingPolicy>,
        max_iterations: Option<u64>,
    ) -> VuShared<(), ()> {
        let shutdown_handle = ShutdownHandle::new();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone(), None));
        let runner_context = Arc::new(RunnerContext::new(
            executor,
            Arc::new(MetricsCollector::new()),
            shutdown_handle.clone(),
            RunConfig::default(),
            "test".to_string(),
        ));

        let mut checks = Checks::new();
        checks.add(Check::new("status is 200", |r| Ok(r.status() == 200)));

        VuShared {
            runner_context,
            scenario,
            checks: Arc::new(checks),
            pacing,
            max_iterations,
            shutdown_handle,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn ok_scenario() -> ScenarioFn<(), ()> {
        Arc::new(|_: &mut VuContext<(), ()>| -> ScenarioResult {
            Ok(RequestOutcome::new(200, "ok", Duration::from_millis(1)))
        })
    }

    #[test]
    fn iteration_budget_stops_the_vu() {
        let mut pool = ThreadVuPool::new(shared(ok_scenario(), Arc::new(NoPacing), Some(25)));

        for _ in 0..4 {
            pool.spawn().unwrap();
        }
        // Virtual users that used up their budget keep their slot until retired.
        while pool.shared.running.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(4, pool.live());

        for _ in 0..4 {
            pool.retire();
        }
        pool.drain(Duration::from_secs(5));

        let snapshot = pool.shared.runner_context.metrics().snapshot();
        assert_eq!(100, snapshot.total_requests);
        assert_eq!(100, snapshot.checks["status is 200"].passes);
    }

    #[test]
    fn retire_interrupts_pacing() {
        let mut pool = ThreadVuPool::new(shared(
            ok_scenario(),
            Arc::new(FixedPacing(Duration::from_secs(60))),
            None,
        ));

        pool.spawn().unwrap();
        while pool.shared.runner_context.metrics().total_requests() == 0 {
            std::thread::sleep(Duration::from_millis(5));
        }

        let started = Instant::now();
        pool.retire();
        pool.drain(Duration::from_secs(30));

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(0, pool.draining());
        assert_eq!(1, pool.shared.runner_context.metrics().total_requests());
    }

    #[test]
    fn panicking_scenario_is_isolated() {
        let scenario: ScenarioFn<(), ()> = Arc::new(|ctx: &mut VuContext<(), ()>| -> ScenarioResult {
            if ctx.iteration() % 2 == 0 {
                panic!("even iteration");
            }
            Ok(RequestOutcome::new(200, "", Duration::ZERO))
        });
        let mut pool = ThreadVuPool::new(shared(scenario, Arc::new(NoPacing), Some(10)));

        pool.spawn().unwrap();
        while pool.shared.running.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.retire();
        pool.drain(Duration::from_secs(5));

        let snapshot = pool.shared.runner_context.metrics().snapshot();
        assert_eq!(10, snapshot.total_requests);
        assert_eq!(5, snapshot.scenario_errors);
        assert_eq!(5, snapshot.completed_iterations);
        assert_eq!(0, pool.shared.running.load(Ordering::SeqCst));
    }
}
