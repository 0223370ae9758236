mod cli;
mod context;
mod definition;
mod error;
mod executor;
mod init;
mod monitor;
mod pacing;
mod progress;
mod run;
mod scheduler;
mod shutdown;
mod stage;
mod types;
mod vu;

pub use cli::StampedeScenarioCli;

pub mod prelude {
    pub use crate::cli::StampedeScenarioCli;
    pub use crate::context::{RunConfig, RunnerContext, UserValuesConstraint, VuContext};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder, ScenarioResult};
    pub use crate::error::SetupError;
    pub use crate::executor::Executor;
    pub use crate::init::init;
    pub use crate::pacing::{FixedPacing, NoPacing, PacingPolicy, UniformPacing};
    pub use crate::run::run;
    pub use crate::stage::{load_stages, Stage, StagePlan};
    pub use crate::types::StampedeResult;

    pub use stampede_core::prelude::{ShutdownSignalError, TimeoutError};
    pub use stampede_instruments::{
        Check, CheckResult, MetricsCollector, RequestFailure, RequestOutcome,
    };
    pub use stampede_summary_model::{MetricsSnapshot, RunStatus, RunSummary};
}
