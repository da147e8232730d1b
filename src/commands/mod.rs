pub mod discover;
pub mod progress;
pub mod receive;
pub mod send;
pub mod settings;

use std::future::Future;

use anyhow::Context;
use mediashare_transfer::TransferService;
use mediashare_transfer::models::TransferState;

/// Drives a session future to the end. Ctrl-C cancels the session and still waits for it
/// so its cleanup runs before the process exits.
pub(crate) async fn run_session<F>(
    service: &TransferService,
    command: &'static str,
    session: F,
) -> anyhow::Result<TransferState>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!(event = "command_start", command);
    let printer = progress::spawn_printer(service);
    let mut task = tokio::spawn(session);

    tokio::select! {
        joined = &mut task => joined.with_context(|| format!("{command} session task"))?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(event = "command_interrupted", command);
            service.cancel_transfer();
            task.await.with_context(|| format!("{command} session task"))?;
        }
    }

    printer.abort();
    let state = service.current_state();
    tracing::info!(event = "command_end", command, state = state.name());
    Ok(state)
}

/// Turns the final session state into the process outcome.
pub(crate) fn finish(state: &TransferState) -> anyhow::Result<()> {
    match state {
        TransferState::Done => {
            println!("Transfer complete.");
            Ok(())
        }
        TransferState::Error { message } => anyhow::bail!("{message}"),
        TransferState::Idle => {
            println!("Transfer canceled.");
            Ok(())
        }
        other => {
            tracing::warn!(event = "command_unfinished_state", state = other.name());
            Ok(())
        }
    }
}
