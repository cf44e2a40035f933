mod cli;
mod roles;

use std::process::ExitCode;

use clap::Parser;
use depot_core::observability::init_logging;
use tracing::{error, warn};

use crate::cli::{Cli, Command};

const DOTENV_PATH: &str = "config/.env";

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::from_path(DOTENV_PATH);
    let cli = Cli::parse();
    let config = cli.settings.to_config();

    let _logging = match init_logging(&config.log_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("depot: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = dotenv {
        if !e.not_found() {
            warn!(path = DOTENV_PATH, error = %e, "failed to load env file");
        }
    }

    if let Err(e) = config.validate() {
        error!(error = %e, "invalid configuration");
        return ExitCode::FAILURE;
    }
    let config = match config.absolutize() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let forwarded = cli.settings.forwarded_args();
    let result = match cli.command {
        Command::Serve => roles::serve(config, forwarded).await,
        Command::Worker { index } => roles::worker(config, index).await,
        Command::RunJob { name } => roles::run_job(config, &name).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "exiting after failure");
            ExitCode::FAILURE
        }
    }
}
