//! hubmux - command-line client for the agent Hub
//!
//! One-shot subcommands manage agents over the control API; `attach`
//! connects the terminal to an agent's PTY.

use std::process::ExitCode;

use hubmux_client::cli::Args;
use hubmux_client::commands;
use hubmux_utils::init_logging_with_config;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments first (before terminal setup)
    let args = Args::parse_args();

    if let Err(e) = init_logging_with_config(args.log_config()) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::debug!("CLI args: {:?}", args);

    match commands::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("hubmux error: {}", e);
            // Printed after the raw-mode guard has restored the terminal
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
