//! `cozmo-caretaker [USER_NAME]`: run one caretaking session and exit.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cozmo_caretaker::{Settings, TaskRunner};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Greets the user and delivers medicine, water or the travel kit from their calendar.
#[derive(Parser, Debug)]
#[command(name = "cozmo-caretaker", version, about)]
struct Cli {
    /// Name of the enrolled face to look for (overrides robot.user_name).
    user_name: Option<String>,

    /// Path to a TOML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cozmo_caretaker=info")),
        )
        .init();

    // Every failure ends here as a diagnostic; the process still exits normally.
    if let Err(e) = run(Cli::parse()).await {
        error!("{e:#}");
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings =
        Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(name) = cli.user_name {
        settings.robot.user_name = name;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, stopping session...");
                cancel.cancel();
            }
        });
    }

    let runner = TaskRunner::connect(settings)
        .context("failed to set up session")?
        .with_cancellation(cancel);
    let outcome = runner.run().await.context("session aborted")?;
    info!(?outcome, "session finished");
    Ok(())
}
