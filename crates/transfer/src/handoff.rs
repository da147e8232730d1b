//! Tap-to-share handoff. A sender publishes its [`SessionInfo`] as a small payload and
//! a receiver that taps it gets the same value back as an event.

use tokio::sync::broadcast;

use crate::models::SessionInfo;
use crate::AppResult;

pub trait TapHandoff: Send + Sync {
    fn is_supported(&self) -> bool;

    /// Payload handed to the next peer that taps this device. `None` clears it.
    fn set_push_payload(&self, info: Option<&SessionInfo>) -> AppResult<()>;

    fn enable_foreground_dispatch(&self) -> AppResult<()>;

    fn disable_foreground_dispatch(&self) -> AppResult<()>;

    /// Sessions received from tapped peers, when supported.
    fn tap_events(&self) -> Option<broadcast::Receiver<SessionInfo>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedTapHandoff;

impl TapHandoff for UnsupportedTapHandoff {
    fn is_supported(&self) -> bool {
        false
    }

    fn set_push_payload(&self, _info: Option<&SessionInfo>) -> AppResult<()> {
        Ok(())
    }

    fn enable_foreground_dispatch(&self) -> AppResult<()> {
        Ok(())
    }

    fn disable_foreground_dispatch(&self) -> AppResult<()> {
        Ok(())
    }

    fn tap_events(&self) -> Option<broadcast::Receiver<SessionInfo>> {
        None
    }
}

#[cfg(test)]
#[path = "../tests/transfer/handoff_tests.rs"]
mod tests;
