use std::sync::Mutex;
use std::time::Instant;

use crate::models::SessionRole;

/// Keeps the process alive while a transfer runs in the background.
pub trait KeepAliveService: Send + Sync {
    fn start(&self, role: SessionRole);

    fn stop(&self);
}

/// Headless hosts have no OS keep-alive; this only records the lifecycle.
#[derive(Debug, Default)]
pub struct LoggingKeepAlive {
    active: Mutex<Option<(SessionRole, Instant)>>,
}

impl LoggingKeepAlive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_role(&self) -> Option<SessionRole> {
        self.active
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|(role, _)| *role))
    }
}

impl KeepAliveService for LoggingKeepAlive {
    fn start(&self, role: SessionRole) {
        if let Ok(mut guard) = self.active.lock() {
            *guard = Some((role, Instant::now()));
        }
        tracing::info!(event = "transfer_keep_alive_started", role = role.as_str());
    }

    fn stop(&self) {
        let finished = self.active.lock().ok().and_then(|mut guard| guard.take());
        if let Some((role, started_at)) = finished {
            tracing::info!(
                event = "transfer_keep_alive_stopped",
                role = role.as_str(),
                elapsed_ms = started_at.elapsed().as_millis() as u64
            );
        }
    }
}
