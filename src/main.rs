use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use webclaw_lib::agent_engine::state::SessionStatus;
use webclaw_lib::RunOptions;

/// Drive a browser toward a natural-language objective.
#[derive(Debug, Parser)]
#[command(name = "webclaw", version, about)]
struct Cli {
    /// What the agent should accomplish, e.g. "find the pricing page on example.com".
    objective: String,

    /// Path to config.toml (default: next to the executable, then the working directory).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    /// Override agent.max_steps.
    #[arg(long)]
    max_steps: Option<u32>,

    /// Page to open before the first step.
    #[arg(long)]
    start_url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let opts = RunOptions {
        objective: cli.objective,
        config_path: cli.config,
        headed: cli.headed,
        max_steps: cli.max_steps,
        start_url: cli.start_url,
    };

    match webclaw_lib::run(opts).await {
        Ok(state) => {
            println!(
                "{:?} after {} steps: {}",
                state.status,
                state.step_count,
                state
                    .summary
                    .as_deref()
                    .or(state.termination_reason.as_deref())
                    .unwrap_or("")
            );
            if state.status == SessionStatus::Completed {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("webclaw: {e}");
            ExitCode::from(2)
        }
    }
}
