use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;

/// Summary of a run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The sum of all stage durations, in milliseconds
    pub planned_duration_ms: u64,
    /// How long the run actually took, including the drain at the end, in milliseconds
    ///
    /// This can be shorter than [RunSummary::planned_duration_ms] if the run was interrupted.
    pub actual_duration_ms: u64,
    /// The highest number of live virtual users at any point in the run
    pub peak_vus: usize,
    /// The number of virtual users started over the whole run
    pub vus_spawned: usize,
    /// The number of stop signals sent to virtual users over the whole run
    pub vus_retired: usize,
    /// Whether the run as a whole succeeded
    pub status: RunStatus,
    /// Aggregated request, check and latency metrics
    pub metrics: MetricsSnapshot,
    /// The version of Stampede that was used for this run
    pub stampede_version: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// At least one virtual user completed an iteration.
    Completed,
    /// Every iteration of every virtual user failed, or none ran at all.
    NoCompletedIterations,
}

impl RunSummary {
    /// Create a new run summary
    pub fn new(
        run_id: String,
        scenario_name: String,
        started_at: i64,
        planned_duration: Duration,
        stampede_version: String,
    ) -> Self {
        Self {
            run_id,
            scenario_name,
            started_at,
            planned_duration_ms: planned_duration.as_millis() as u64,
            actual_duration_ms: 0,
            peak_vus: 0,
            vus_spawned: 0,
            vus_retired: 0,
            status: RunStatus::NoCompletedIterations,
            metrics: MetricsSnapshot::default(),
            stampede_version,
        }
    }

    /// Set the VU counters gathered by the scheduler
    pub fn set_vu_counts(&mut self, peak_vus: usize, vus_spawned: usize, vus_retired: usize) {
        self.peak_vus = peak_vus;
        self.vus_spawned = vus_spawned;
        self.vus_retired = vus_retired;
    }

    /// Attach the final metrics and derive the run status from them
    pub fn finish(&mut self, actual_duration: Duration, metrics: MetricsSnapshot) {
        self.actual_duration_ms = actual_duration.as_millis() as u64;
        self.status = if metrics.completed_iterations > 0 {
            RunStatus::Completed
        } else {
            RunStatus::NoCompletedIterations
        };
        self.metrics = metrics;
    }

    pub fn is_failure(&self) -> bool {
        self.status != RunStatus::Completed
    }
}

/// Point in time view of the metrics collected during a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    /// Every recorded request, whether it succeeded or not
    pub total_requests: u64,
    /// Requests that got an error status, a transport error, timed out, or whose scenario failed
    pub failed_requests: u64,
    /// Requests that exceeded the request timeout
    pub timed_out_requests: u64,
    /// Iterations where the scenario itself returned an error or panicked
    pub scenario_errors: u64,
    /// Iterations where the scenario produced a request outcome
    pub completed_iterations: u64,
    /// Check results keyed by check name
    pub checks: BTreeMap<String, CheckSummary>,
    pub latency: LatencySummary,
}

impl MetricsSnapshot {
    /// Fraction of requests that failed, between 0 and 1. Zero when nothing was recorded.
    pub fn error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CheckSummary {
    pub passes: u64,
    pub fails: u64,
    /// The message from the most recent predicate that errored, if any did
    pub last_error: Option<String>,
}

impl CheckSummary {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of evaluations that passed, between 0 and 1. Zero when the check never ran.
    pub fn pass_rate(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.passes as f64 / total as f64,
        }
    }
}

/// Latency distribution, all values in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    /// Summarise a set of latency samples. The samples are sorted in place.
    pub fn from_samples(samples: &mut [Duration]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }

        samples.sort_unstable();

        let total: Duration = samples.iter().sum();
        Self {
            count: samples.len(),
            min_ms: as_ms(samples[0]),
            mean_ms: as_ms(total) / samples.len() as f64,
            max_ms: as_ms(samples[samples.len() - 1]),
            p50_ms: as_ms(percentile(samples, 50)),
            p90_ms: as_ms(percentile(samples, 90)),
            p95_ms: as_ms(percentile(samples, 95)),
            p99_ms: as_ms(percentile(samples, 99)),
        }
    }
}

/// Nearest-rank percentile of already sorted, non-empty samples.
fn percentile(sorted: &[Duration], pct: usize) -> Duration {
    let rank = (pct * sorted.len()).div_ceil(100);
    sorted[rank.clamp(1, sorted.len()) - 1]
}

fn as_ms(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

/// Append the run summary to a file
///
/// The summary is written as a single line of JSON followed by a newline, so one file can
/// collect many runs. The recommended file extension is `.jsonl`.
pub fn append_run_summary(run_summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_run_summary(run_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the run summary to a writer
pub fn store_run_summary<W: Write>(run_summary: &RunSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, run_summary)?;
    Ok(())
}

/// Load every run summary from a file written by [append_run_summary].
pub fn load_summary_runs(path: &Path) -> anyhow::Result<Vec<RunSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut runs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        runs.push(serde_json::from_str(&line)?);
    }
    Ok(runs)
}
