use std::{fmt::Debug, sync::Arc, time::Duration};

use stampede_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use stampede_instruments::MetricsCollector;

use crate::executor::Executor;

pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

impl UserValuesConstraint for () {}

/// Connection settings for the system under test, resolved from the scenario definition and the
/// command line.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub base_url: Option<String>,
    pub headers: Vec<(String, String)>,
    pub request_timeout: Option<Duration>,
}

/// Shared state for a run. Built before the setup hook and handed to every virtual user.
#[derive(Debug)]
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    metrics: Arc<MetricsCollector>,
    shutdown_handle: ShutdownHandle,
    config: RunConfig,
    run_id: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        metrics: Arc<MetricsCollector>,
        shutdown_handle: ShutdownHandle,
        config: RunConfig,
        run_id: String,
    ) -> Self {
        Self {
            executor,
            metrics,
            shutdown_handle,
            config,
            run_id,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// The base URL of the system under test, if one was configured.
    pub fn base_url(&self) -> Option<&str> {
        self.config.base_url.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.config.headers
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.config.request_timeout
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Stop the whole run. In-flight requests are cancelled and every virtual user exits at its
    /// next iteration boundary.
    pub fn force_stop_scenario(&self) {
        log::warn!("Scenario requested to stop the run");
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// The context passed to the scenario on every iteration of a virtual user.
///
/// The user value `V` is created once per virtual user and kept across its iterations.
pub struct VuContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    vu_id: usize,
    iteration: u64,
    runner_context: Arc<RunnerContext<RV>>,
    retire_listener: DelegatedShutdownListener,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> VuContext<RV, V> {
    pub(crate) fn new(
        vu_id: usize,
        runner_context: Arc<RunnerContext<RV>>,
        retire_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            vu_id,
            iteration: 0,
            runner_context,
            retire_listener,
            value: Default::default(),
        }
    }

    /// The sequence number of this virtual user, starting at 1.
    pub fn vu_id(&self) -> usize {
        self.vu_id
    }

    /// The number of the iteration currently running, starting at 1.
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn next_iteration(&mut self) -> u64 {
        self.iteration += 1;
        self.iteration
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn executor(&self) -> &Arc<Executor> {
        self.runner_context.executor()
    }

    /// Signalled when the scheduler retires this virtual user. A long running scenario can race
    /// work against it to stop early.
    pub fn retire_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.retire_listener
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Debug for VuContext<RV, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VuContext")
            .field("vu_id", &self.vu_id)
            .field("iteration", &self.iteration)
            .field("value", &self.value)
            .finish()
    }
}
