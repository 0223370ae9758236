use tabled::Tabled;

#[derive(Tabled)]
pub struct RequestsRow {
    pub total_requests: u64,
    pub failed_requests: u64,
    #[tabled(display = "percent")]
    pub error_rate: f64,
    pub timed_out: u64,
    pub scenario_errors: u64,
    #[tabled(display = "float2")]
    pub requests_per_second: f64,
}

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passes: u64,
    pub fails: u64,
    #[tabled(display = "percent")]
    pub pass_rate: f64,
}

#[derive(Tabled)]
pub struct LatencyRow {
    pub samples: usize,
    #[tabled(display = "float2")]
    pub min_ms: f64,
    #[tabled(display = "float2")]
    pub mean_ms: f64,
    #[tabled(display = "float2")]
    pub p50_ms: f64,
    #[tabled(display = "float2")]
    pub p90_ms: f64,
    #[tabled(display = "float2")]
    pub p95_ms: f64,
    #[tabled(display = "float2")]
    pub p99_ms: f64,
    #[tabled(display = "float2")]
    pub max_ms: f64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}
