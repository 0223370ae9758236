mod check;
mod metrics;
mod outcome;
mod report;

pub use check::{Check, CheckResult, Checks};
pub use metrics::MetricsCollector;
pub use outcome::{RequestFailure, RequestOutcome};
pub use report::{print_summary, render_summary};
