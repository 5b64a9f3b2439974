mod args;
mod commands;
mod config;
mod logger;

use std::process::ExitCode;

use clap::Parser;

use crate::args::Cli;
use crate::commands::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = config::load_config(cli.config)?;
    logger::init(&config.log)?;

    commands::run(cli.command, config).await
}
