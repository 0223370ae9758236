use std::time::Duration;

/// A problem with the scenario configuration. The run is aborted before any virtual user starts.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    #[display("At least one stage must be configured")]
    NoStages,
    #[display("Stage {index} has a zero duration, every stage must have a duration")]
    ZeroStageDuration { index: usize },
    #[display("The stages add up to a longer run than can be represented")]
    PlanTooLong,
    #[display("Invalid stage file [{path}]: {reason}")]
    InvalidStageFile { path: String, reason: String },
    #[display("No scenario was configured, call `use_scenario` on the scenario definition")]
    NoScenario,
    #[display("The control tick interval must be greater than zero")]
    ZeroTickInterval,
    #[display("Pacing minimum {min:?} is greater than maximum {max:?}")]
    InvalidPacing { min: Duration, max: Duration },
}
