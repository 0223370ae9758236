use std::cmp::min;
use std::fmt::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressState, ProgressStyle};
use stampede_core::prelude::DelegatedShutdownListener;

const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{wide_bar:.cyan/blue}] [{elapsed_precise} / {planned_runtime}] {msg}";

/// Displays a progress bar while the run is in progress, showing how long is left and how many
/// virtual users are running.
pub(crate) fn start_progress(
    planned_runtime: Duration,
    running_vus: Arc<AtomicUsize>,
    shutdown_listener: DelegatedShutdownListener,
) -> anyhow::Result<()> {
    let style = ProgressStyle::with_template(PROGRESS_TEMPLATE)?
        .with_key("planned_runtime", {
            let hours = planned_runtime.as_secs() / 3600;
            let minutes = (planned_runtime.as_secs() % 3600) / 60;
            let seconds = planned_runtime.as_secs() % 60;
            move |_state: &ProgressState, w: &mut dyn Write| {
                let _ = write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds);
            }
        })
        .progress_chars("#>-");

    std::thread::Builder::new()
        .name("progress".to_string())
        .spawn(move || {
            let start_time = Instant::now();
            let pb = ProgressBar::new(planned_runtime.as_secs());
            pb.set_style(style);

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Progress thread shutting down");
                    pb.finish_and_clear();
                    break;
                }

                let new = min(start_time.elapsed().as_secs(), planned_runtime.as_secs());
                pb.set_position(new);
                pb.set_message(format!("{} VUs", running_vus.load(Ordering::Relaxed)));
                std::thread::sleep(Duration::from_millis(500));
            }
        })?;

    Ok(())
}
