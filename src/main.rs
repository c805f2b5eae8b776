mod agents;
mod artifacts;
mod cli;
mod config;
mod error;
mod golang;
mod ports;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("GOMODUP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_path = Path::new(&cli.path);
    let result = match cli.command {
        Commands::Update {
            manifest,
            deps,
            update_type,
            new_major,
            options,
            binary_source,
            json,
        } => workflow::execute_update(
            project_path,
            cli.config.as_deref(),
            workflow::UpdateArgs {
                manifest,
                deps,
                update_type,
                new_major,
                options,
                binary_source,
                json,
            },
        ),
        Commands::Status => workflow::execute_status(project_path).map(|_| false),
    };

    match result {
        Ok(false) => {}
        Ok(true) => process::exit(1),
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            process::exit(1);
        }
    }
}
