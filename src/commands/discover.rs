use std::time::Duration;

use mediashare_transfer::TransferService;
use mediashare_transfer::models::SessionInfo;
use tokio::time::Instant;

use crate::bootstrap::AppContext;

pub(crate) async fn run(context: &AppContext, wait_secs: u64) -> anyhow::Result<()> {
    println!("Listening for senders for {wait_secs}s...");
    let sessions = collect_sessions(&context.service, Duration::from_secs(wait_secs)).await?;
    if sessions.is_empty() {
        println!("No senders found.");
    }
    Ok(())
}

/// Gathers distinct sessions until `window` elapses, listing each one as it arrives.
pub(crate) async fn collect_sessions(
    service: &TransferService,
    window: Duration,
) -> anyhow::Result<Vec<SessionInfo>> {
    let mut stream = service.discover()?;
    let deadline = Instant::now() + window;
    let mut sessions = Vec::new();

    while let Ok(Some(session)) = tokio::time::timeout_at(deadline, stream.next()).await {
        println!(
            "  {}. {} ({})",
            sessions.len() + 1,
            session.device_name,
            session.address()
        );
        sessions.push(session);
    }

    stream.cancel();
    tracing::info!(event = "discovery_window_closed", found = sessions.len());
    Ok(sessions)
}
