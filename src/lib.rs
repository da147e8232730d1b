mod bootstrap;
mod cli;
mod commands;

use clap::Parser;

pub use cli::{Cli, Command, GlobalArgs};

pub async fn run() -> anyhow::Result<()> {
    run_with(Cli::parse()).await
}

pub async fn run_with(cli: Cli) -> anyhow::Result<()> {
    let context = bootstrap::AppContext::init(&cli.global)?;
    tracing::debug!(event = "app_started", log_dir = %context.log_dir().display());

    let result = match cli.command {
        Command::Send { paths, artist } => commands::send::run(&context, paths, artist).await,
        Command::Receive {
            host,
            port,
            yes,
            wait_secs,
        } => commands::receive::run(&context, host.zip(port), yes, wait_secs).await,
        Command::Discover { wait_secs } => commands::discover::run(&context, wait_secs).await,
        Command::Settings {
            device_name,
            media_dir,
            chunk_size_bytes,
        } => commands::settings::run(&context, device_name, media_dir, chunk_size_bytes),
    };

    if let Err(error) = &result {
        tracing::error!(event = "app_command_failed", error = %error);
    }
    mediashare_logging::shutdown_logging();
    result
}
