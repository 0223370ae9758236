use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(about, long_about = None)]
pub struct StampedeScenarioCli {
    /// The base URL of the service to test, overriding the scenario's default
    #[clap(long)]
    pub base_url: Option<String>,

    /// A JSON or YAML file with the stages to run, replacing the scenario's own stages.
    ///
    /// The file holds either a list of stages or an object with a `stages` field. Each stage has a
    /// `duration` (seconds, or a value like `500ms`, `30s`, `1m30s`) and a `target` number of
    /// virtual users.
    #[clap(long)]
    pub stages: Option<PathBuf>,

    /// Cancel any request that takes longer than this many milliseconds and record it as a timeout
    #[clap(long)]
    pub request_timeout_ms: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Log a line with the live virtual user count, request count and error rate every this many seconds
    #[clap(long)]
    pub summary_interval_s: Option<u64>,

    /// Append the run summary as a line of JSON to this file once the run is over
    #[clap(long)]
    pub summary_file: Option<PathBuf>,
}
