mod summary_tables;

use crate::report::summary_tables::{CheckRow, LatencyRow, RequestsRow};
use stampede_summary_model::{RunStatus, RunSummary};
use std::fmt::Write;
use tabled::settings::Style;
use tabled::Table;

/// Render a human-readable report of a finished run.
pub fn render_summary(summary: &RunSummary) -> String {
    let metrics = &summary.metrics;
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(out, "\nSummary of run {} [{}]", summary.scenario_name, summary.run_id);
    let _ = writeln!(
        out,
        "Ran for {:.1}s of a planned {:.1}s with a peak of {} VUs ({} started, {} stopped)",
        summary.actual_duration_ms as f64 / 1000.0,
        summary.planned_duration_ms as f64 / 1000.0,
        summary.peak_vus,
        summary.vus_spawned,
        summary.vus_retired,
    );

    let mut requests = Table::new([RequestsRow {
        total_requests: metrics.total_requests,
        failed_requests: metrics.failed_requests,
        error_rate: metrics.error_rate(),
        timed_out: metrics.timed_out_requests,
        scenario_errors: metrics.scenario_errors,
        requests_per_second: requests_per_second(summary),
    }]);
    requests.with(Style::modern());
    let _ = writeln!(out, "\nRequests\n{requests}");

    if !metrics.checks.is_empty() {
        let rows = metrics
            .checks
            .iter()
            .map(|(name, check)| CheckRow {
                check: name.clone(),
                passes: check.passes,
                fails: check.fails,
                pass_rate: check.pass_rate(),
            })
            .collect::<Vec<_>>();
        let mut checks = Table::new(rows);
        checks.with(Style::modern());
        let _ = writeln!(out, "\nChecks\n{checks}");

        for (name, check) in &metrics.checks {
            if let Some(error) = &check.last_error {
                let _ = writeln!(out, "Last error for [{name}]: {error}");
            }
        }
    }

    let latency = &metrics.latency;
    let mut latency_table = Table::new([LatencyRow {
        samples: latency.count,
        min_ms: latency.min_ms,
        mean_ms: latency.mean_ms,
        p50_ms: latency.p50_ms,
        p90_ms: latency.p90_ms,
        p95_ms: latency.p95_ms,
        p99_ms: latency.p99_ms,
        max_ms: latency.max_ms,
    }]);
    latency_table.with(Style::modern());
    let _ = writeln!(out, "\nLatency\n{latency_table}");

    if summary.status == RunStatus::NoCompletedIterations {
        let _ = writeln!(out, "\nRun FAILED: no virtual user completed an iteration");
    }

    out
}

pub fn print_summary(summary: &RunSummary) {
    println!("{}", render_summary(summary));
}

fn requests_per_second(summary: &RunSummary) -> f64 {
    if summary.actual_duration_ms == 0 {
        0.0
    } else {
        summary.metrics.total_requests as f64 / (summary.actual_duration_ms as f64 / 1000.0)
    }
}
