use crate::outcome::RequestOutcome;
use parking_lot::{Mutex, RwLock};
use stampede_summary_model::{CheckSummary, LatencySummary, MetricsSnapshot};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const LATENCY_SHARDS: usize = 32;

#[derive(Debug, Default)]
struct CheckCounter {
    passes: AtomicU64,
    fails: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Shared aggregation point for everything the virtual users record.
///
/// Request counters are plain atomics. Each check gets its own pair of atomic counters, found
/// through a map that is only write-locked the first time a check name is seen. Latency samples
/// are spread over a fixed set of shards, picked by the recording virtual user's id, so that
/// concurrent users rarely wait on the same lock.
#[derive(Debug)]
pub struct MetricsCollector {
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    timed_out_requests: AtomicU64,
    scenario_errors: AtomicU64,
    completed_iterations: AtomicU64,
    checks: RwLock<HashMap<String, Arc<CheckCounter>>>,
    latency: Box<[Mutex<Vec<Duration>>]>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            timed_out_requests: AtomicU64::new(0),
            scenario_errors: AtomicU64::new(0),
            completed_iterations: AtomicU64::new(0),
            checks: RwLock::new(HashMap::new()),
            latency: (0..LATENCY_SHARDS).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Record the outcome of an iteration that produced a response or a request failure.
    ///
    /// Latency is sampled for every outcome except timeouts, which would only measure the timeout.
    pub fn record_outcome(&self, vu_id: usize, outcome: &RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.completed_iterations.fetch_add(1, Ordering::Relaxed);

        if outcome.is_failure() {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }

        if outcome.timed_out() {
            self.timed_out_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.latency[vu_id % LATENCY_SHARDS]
                .lock()
                .push(outcome.elapsed());
        }
    }

    /// Record an iteration that was cut short by the request timeout.
    pub fn record_timeout(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.timed_out_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an iteration where the scenario returned an error or panicked.
    pub fn record_scenario_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        self.scenario_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Make a check show up in snapshots even if it never gets evaluated.
    pub fn register_check(&self, name: &str) {
        self.check_counter(name);
    }

    pub fn record_check(&self, name: &str, passed: bool, error: Option<String>) {
        let counter = self.check_counter(name);
        if passed {
            counter.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            counter.fails.fetch_add(1, Ordering::Relaxed);
        }

        if let Some(error) = error {
            *counter.last_error.lock() = Some(error);
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn completed_iterations(&self) -> u64 {
        self.completed_iterations.load(Ordering::Relaxed)
    }

    /// Take a point in time copy of the metrics.
    ///
    /// Writers are not paused, so counters that are read later may include records that earlier
    /// counters do not. Every record is counted exactly once in the final snapshot taken after all
    /// writers have stopped.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let checks = self
            .checks
            .read()
            .iter()
            .map(|(name, counter)| {
                (
                    name.clone(),
                    CheckSummary {
                        passes: counter.passes.load(Ordering::Relaxed),
                        fails: counter.fails.load(Ordering::Relaxed),
                        last_error: counter.last_error.lock().clone(),
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        let mut samples = Vec::new();
        for shard in self.latency.iter() {
            samples.extend_from_slice(&shard.lock());
        }

        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            timed_out_requests: self.timed_out_requests.load(Ordering::Relaxed),
            scenario_errors: self.scenario_errors.load(Ordering::Relaxed),
            completed_iterations: self.completed_iterations.load(Ordering::Relaxed),
            checks,
            latency: LatencySummary::from_samples(&mut samples),
        }
    }

    fn check_counter(&self, name: &str) -> Arc<CheckCounter> {
        if let Some(counter) = self.checks.read().get(name) {
            return counter.clone();
        }

        self.checks
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }
}
