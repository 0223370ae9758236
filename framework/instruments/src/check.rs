use crate::metrics::MetricsCollector;
use crate::outcome::RequestOutcome;
use stampede_core::prelude::ScenarioPanicError;
use std::fmt::{Debug, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub type CheckPredicate = Arc<dyn Fn(&RequestOutcome) -> anyhow::Result<bool> + Send + Sync>;

/// A named assertion against a [RequestOutcome].
#[derive(Clone)]
pub struct Check {
    name: String,
    predicate: CheckPredicate,
}

impl Check {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RequestOutcome) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the predicate. Errors and panics from the predicate count as a failed check and their
    /// message is kept on the result.
    pub fn evaluate(&self, outcome: &RequestOutcome) -> CheckResult {
        let (passed, error) =
            match std::panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(outcome))) {
                Ok(Ok(passed)) => (passed, None),
                Ok(Err(e)) => (false, Some(format!("{e:#}"))),
                Err(payload) => (false, Some(ScenarioPanicError::from_payload(payload).to_string())),
            };

        if let Some(error) = &error {
            log::debug!("Check [{}] errored: {}", self.name, error);
        }

        CheckResult {
            name: self.name.clone(),
            passed,
            error,
        }
    }
}

impl Debug for Check {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub error: Option<String>,
}

/// The set of checks to apply to every outcome a scenario produces.
#[derive(Debug, Clone, Default)]
pub struct Checks {
    checks: Vec<Check>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check.
    ///
    /// Panics if a check with the same name has already been added.
    pub fn add(&mut self, check: Check) {
        if self.contains(check.name()) {
            panic!("Check [{}] is already defined", check.name());
        }

        self.checks.push(check);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.iter().any(|c| c.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name())
    }

    /// Evaluate every check against the outcome and record the results.
    pub fn evaluate(
        &self,
        outcome: &RequestOutcome,
        metrics: &MetricsCollector,
    ) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|check| {
                let result = check.evaluate(outcome);
                metrics.record_check(&result.name, result.passed, result.error.clone());
                result
            })
            .collect()
    }
}
