use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stampede_instruments::{Check, Checks, RequestOutcome};

use crate::cli::StampedeScenarioCli;
use crate::context::{RunConfig, RunnerContext, UserValuesConstraint, VuContext};
use crate::error::SetupError;
use crate::init::init;
use crate::pacing::{NoPacing, PacingPolicy};
use crate::stage::{load_stages, Stage, StagePlan};

pub type HookResult = anyhow::Result<()>;

/// What a scenario returns for one iteration. Return an error for anything that prevented a
/// request from being made, the runner records it as a failed request.
pub type ScenarioResult = anyhow::Result<RequestOutcome>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type GlobalHook<RV> = fn(Arc<RunnerContext<RV>>) -> HookResult;
pub type ScenarioFn<RV, V> = Arc<dyn Fn(&mut VuContext<RV, V>) -> ScenarioResult + Send + Sync>;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// The builder for a scenario definition.
///
/// This must be used at the start of a test to define the scenario that you want to run.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    /// Command line overrides, only present when the builder was created with
    /// [ScenarioDefinitionBuilder::new_with_init] or given one with [ScenarioDefinitionBuilder::with_cli].
    cli: Option<StampedeScenarioCli>,
    /// The load profile. Replaced by the stages file if one is given on the command line.
    stages: Vec<Stage>,
    default_base_url: Option<String>,
    headers: Vec<(String, String)>,
    request_timeout: Option<Duration>,
    /// How long each virtual user waits between iterations.
    pacing: Arc<dyn PacingPolicy>,
    checks: Checks,
    /// The work done by a virtual user on each iteration.
    scenario: Option<ScenarioFn<RV, V>>,
    /// Global setup hook for this scenario. It will be run once, before any virtual users are started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Global teardown hook for this scenario. It will be run once, after every virtual user has
    /// stopped. This is best effort, an error is logged but does not fail the run.
    teardown_fn: Option<GlobalHook<RV>>,
    tick_interval: Duration,
    /// How long retired virtual users get to finish their current iteration at the end of the run
    /// before in-flight requests are cancelled.
    graceful_stop: Duration,
    max_iterations_per_vu: Option<u64>,
    summary_interval: Option<Duration>,
    /// Where to append the run summary. Replaced by `--summary-file` if given.
    summary_file: Option<PathBuf>,
    no_progress: bool,
    print_summary: bool,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub(crate) name: String,
    pub(crate) plan: StagePlan,
    pub(crate) config: RunConfig,
    pub(crate) pacing: Arc<dyn PacingPolicy>,
    pub(crate) checks: Checks,
    pub(crate) scenario: ScenarioFn<RV, V>,
    pub(crate) setup_fn: Option<GlobalHookMut<RV>>,
    pub(crate) teardown_fn: Option<GlobalHook<RV>>,
    pub(crate) tick_interval: Duration,
    pub(crate) graceful_stop: Duration,
    pub(crate) max_iterations_per_vu: Option<u64>,
    pub(crate) summary_interval: Option<Duration>,
    pub(crate) summary_file: Option<PathBuf>,
    pub(crate) no_progress: bool,
    pub(crate) print_summary: bool,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Create a scenario definition that ignores the command line. See
    /// [ScenarioDefinitionBuilder::name] for more information about the name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cli: None,
            stages: Vec::new(),
            default_base_url: None,
            headers: Vec::new(),
            request_timeout: None,
            pacing: Arc::new(NoPacing),
            checks: Checks::new(),
            scenario: None,
            setup_fn: None,
            teardown_fn: None,
            tick_interval: DEFAULT_TICK_INTERVAL,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            max_iterations_per_vu: None,
            summary_interval: None,
            summary_file: None,
            no_progress: false,
            print_summary: true,
        }
    }

    /// Initialise logging and parse the command line, then create a scenario definition that the
    /// command line can override. This is what scenario binaries should use.
    pub fn new_with_init(name: &str) -> Self {
        let cli = init();
        Self::new(name).with_cli(cli)
    }

    /// Apply command line overrides. These take priority over the values set on the builder.
    pub fn with_cli(mut self, cli: StampedeScenarioCli) -> Self {
        self.cli = Some(cli);
        self
    }

    pub fn with_stages(mut self, stages: Vec<Stage>) -> Self {
        self.stages = stages;
        self
    }

    /// The base URL to use if none is given with `--base-url`.
    pub fn with_default_base_url(mut self, base_url: &str) -> Self {
        self.default_base_url = Some(base_url.to_string());
        self
    }

    /// A header to send with every request made through the HTTP bindings.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_pacing(mut self, pacing: impl PacingPolicy) -> Self {
        self.pacing = Arc::new(pacing);
        self
    }

    /// Add a named check, applied to the outcome of every iteration.
    ///
    /// Panics if a check with the same name has already been added.
    pub fn use_check<F>(mut self, name: &str, predicate: F) -> Self
    where
        F: Fn(&RequestOutcome) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.checks.add(Check::new(name, predicate));
        self
    }

    /// Set the scenario [ScenarioDefinitionBuilder::scenario] run by every virtual user.
    pub fn use_scenario<F>(mut self, scenario: F) -> Self
    where
        F: Fn(&mut VuContext<RV, V>) -> ScenarioResult + Send + Sync + 'static,
    {
        self.scenario = Some(Arc::new(scenario));
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the global teardown hook [ScenarioDefinitionBuilder::teardown_fn] for this scenario.
    pub fn use_teardown(mut self, teardown_fn: GlobalHook<RV>) -> Self {
        self.teardown_fn = Some(teardown_fn);
        self
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Stop each virtual user after it has run this many iterations.
    pub fn with_max_iterations_per_vu(mut self, max_iterations: u64) -> Self {
        self.max_iterations_per_vu = Some(max_iterations);
        self
    }

    pub fn with_summary_interval(mut self, interval: Duration) -> Self {
        self.summary_interval = Some(interval);
        self
    }

    /// Append the run summary as a line of JSON to `path` when the run is over.
    pub fn with_summary_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.summary_file = Some(path.into());
        self
    }

    pub fn with_no_progress(mut self) -> Self {
        self.no_progress = true;
        self
    }

    /// Return the summary from [crate::run::run] without printing it.
    pub fn with_no_summary_print(mut self) -> Self {
        self.print_summary = false;
        self
    }

    pub(crate) fn build(self) -> Result<ScenarioDefinition<RV, V>, SetupError> {
        let cli = self.cli.unwrap_or_default();

        let stages = match &cli.stages {
            Some(path) => load_stages(path)?,
            None => self.stages,
        };
        let plan = StagePlan::new(stages)?;

        let scenario = self.scenario.ok_or(SetupError::NoScenario)?;

        if self.tick_interval.is_zero() {
            return Err(SetupError::ZeroTickInterval);
        }

        let config = RunConfig {
            base_url: cli.base_url.or(self.default_base_url),
            headers: self.headers,
            request_timeout: cli
                .request_timeout_ms
                .map(Duration::from_millis)
                .or(self.request_timeout),
        };

        Ok(ScenarioDefinition {
            name: self.name,
            plan,
            config,
            pacing: self.pacing,
            checks: self.checks,
            scenario,
            setup_fn: self.setup_fn,
            teardown_fn: self.teardown_fn,
            tick_interval: self.tick_interval,
            graceful_stop: self.graceful_stop,
            max_iterations_per_vu: self.max_iterations_per_vu,
            summary_interval: cli
                .summary_interval_s
                .map(Duration::from_secs)
                .or(self.summary_interval),
            summary_file: cli.summary_file.or(self.summary_file),
            no_progress: self.no_progress || cli.no_progress,
            print_summary: self.print_summary,
        })
    }
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> Debug for ScenarioDefinitionBuilder<RV, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioDefinitionBuilder")
            .field("name", &self.name)
            .field("stages", &self.stages)
            .field("checks", &self.checks)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}
