use std::process::ExitCode;

use clap::Parser;
use cursor_agent_acp::cli::{Cli, Command};
use cursor_agent_acp::runner;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.validate {
        return match runner::validate_config() {
            Ok(()) => {
                println!("configuration OK");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("configuration invalid: {e}");
                ExitCode::from(2)
            }
        };
    }

    let result = match &cli.command {
        Some(Command::Auth { action }) => runner::run_auth(&cli, *action).await,
        None => runner::run_stdio_server(&cli).await,
    };

    runner::shutdown_otel();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("cursor-agent-acp: {e}");
            if atty::is(atty::Stream::Stdin) {
                eprintln!("run with --diagnostic or -v/-vv/-vvv for more detail");
            }
            ExitCode::FAILURE
        }
    }
}
