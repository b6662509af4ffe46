//! stepdeck - interactive step debugger for browser system tests
//!
//! Runs a Capybara system test one page action at a time while a control UI
//! in the browser shows the steps and lets you start, stop, reset or exit.

use clap::Parser;
use stepdeck::commands::Commands;
use stepdeck::common::logging;
use stepdeck::cli;

#[derive(Parser)]
#[command(name = "stepdeck", about = "Interactive step debugger for browser system tests")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Session logs also go to a file; hold the guard so it is flushed on exit
    let _guard = match cli.command {
        Commands::Run { .. } => {
            let (log_path, guard) = logging::init_session();
            if let Some(path) = log_path {
                tracing::debug!("Session log: {}", path.display());
            }
            guard
        }
        _ => {
            logging::init_cli();
            None
        }
    };

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
