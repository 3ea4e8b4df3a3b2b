use std::process::ExitCode;

use clap::Parser;
use reqimport_cli::config::Config;
use reqimport_cli::import::{self, ImportArgs};
use reqimport_cli::logging;
use reqimport_cli::transport::UreqTransport;

fn main() -> ExitCode {
    let args = ImportArgs::parse();
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: failed to load configuration: {e}");
            return ExitCode::from(1);
        }
    };
    logging::init(&config.logging.level);

    match import::run(&args, &config, UreqTransport::default(), import::dry_run_requested()) {
        Ok(exit) => exit.into(),
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::from(1)
        }
    }
}
