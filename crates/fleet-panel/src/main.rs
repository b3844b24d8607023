//! Fleet panel standalone binary.

use std::process::ExitCode;

use clap::Parser;
use fleet_panel::{PanelArgs, cli};

#[tokio::main]
async fn main() -> ExitCode {
    let args = PanelArgs::parse();

    match cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
