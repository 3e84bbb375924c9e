use crate::cli::SurgeCli;
use clap::Parser;

/// Initialise the CLI and logging for the surge runner.
pub fn init() -> SurgeCli {
    env_logger::init();

    SurgeCli::parse()
}
