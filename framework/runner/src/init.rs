use crate::cli::StampedeScenarioCli;
use clap::Parser;

/// Initialise logging and parse the command line for a scenario binary.
pub fn init() -> StampedeScenarioCli {
    // A test harness or an embedding binary may have installed a logger already.
    let _ = env_logger::try_init();

    StampedeScenarioCli::parse()
}
