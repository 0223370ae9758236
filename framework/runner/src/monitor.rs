use stampede_core::prelude::DelegatedShutdownListener;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Usage of the whole machine, in percent, above which the load generator warns that it may be
/// the bottleneck.
const HIGH_CPU_USAGE: f32 = 80.0;

/// Monitor the resource usage of the load generator and report high usage.
///
/// This won't stop the run, it logs a warning so the user knows that latencies measured while the
/// generator was saturated might be inflated.
///
/// The CPU usage for the process is collected every [sysinfo::MINIMUM_CPU_UPDATE_INTERVAL], or
/// every second if that is longer, and compared to the capacity of all cores.
pub(crate) fn start_monitor(shutdown_listener: DelegatedShutdownListener) -> anyhow::Result<()> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let this_process_pid = Pid::from_u32(std::process::id());
            let mut sys = System::new();

            sys.refresh_cpu_all();
            let cpu_count = sys.cpus().len().max(1);
            let interval = sysinfo::MINIMUM_CPU_UPDATE_INTERVAL.max(std::time::Duration::from_secs(1));

            loop {
                if shutdown_listener.should_shutdown() {
                    log::trace!("Monitor thread shutting down");
                    break;
                }

                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[this_process_pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );

                let Some(process) = sys.process(this_process_pid) else {
                    log::warn!("Could not read process info, stopping the resource monitor");
                    break;
                };

                let usage = process.cpu_usage() / cpu_count as f32;
                if usage > HIGH_CPU_USAGE {
                    log::warn!(
                        "High CPU usage detected. The load generator is using {:.2}% of the CPU, with {} available cores. Measured latencies may be inflated",
                        usage,
                        cpu_count
                    );
                }

                std::thread::sleep(interval);
            }
        })?;

    Ok(())
}
