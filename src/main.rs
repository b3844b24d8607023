//! Unified fleet-rs CLI.
//!
//! - `fleet-rs serve` - Run the control plane
//! - `fleet-rs ledger` - Inspect and administer the ledger
//!
//! Each subcommand can also be run as a standalone binary.

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// Fleet-rs unified CLI.
#[derive(Parser)]
#[command(
    name = "fleet-rs",
    version,
    about = "Control plane for a self-hosted proxy fleet",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane.
    #[command(name = "serve", alias = "panel")]
    Serve(Box<fleet_panel::PanelArgs>),

    /// Inspect and administer the ledger.
    #[command(name = "ledger")]
    Ledger(fleet_ledger::LedgerArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => fleet_panel::cli::run(*args).await,
        Commands::Ledger(args) => fleet_ledger::cli::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
