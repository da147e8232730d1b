use std::sync::Arc;

use tokio::sync::watch;

use crate::models::TransferState;

fn stage(state: &TransferState) -> u8 {
    match state {
        TransferState::Idle => 0,
        TransferState::Connecting => 1,
        TransferState::Offering { .. } => 2,
        TransferState::WaitingApproval => 3,
        TransferState::Transferring { .. } => 4,
        TransferState::Done | TransferState::Error { .. } => 5,
    }
}

/// Transitions only move forward. `Idle` is always reachable (reset), progress updates
/// within `Transferring` are allowed, and terminal states stay put until a reset.
fn is_allowed_transition(current: &TransferState, next: &TransferState) -> bool {
    if matches!(next, TransferState::Idle) {
        return true;
    }
    if current.is_terminal() {
        return false;
    }
    if matches!(current, TransferState::Transferring { .. })
        && matches!(next, TransferState::Transferring { .. })
    {
        return true;
    }
    stage(next) > stage(current)
}

/// Last-value store for the session status with any number of observers.
#[derive(Debug, Clone)]
pub struct TransferStateMachine {
    sender: Arc<watch::Sender<TransferState>>,
}

impl Default for TransferStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStateMachine {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(TransferState::Idle);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn current(&self) -> TransferState {
        self.sender.borrow().clone()
    }

    /// Applies `next` if the transition is allowed and returns whether it was applied.
    pub fn set(&self, next: TransferState) -> bool {
        let mut applied = false;
        let mut rejected_from: Option<&'static str> = None;
        let next_name = next.name();
        self.sender.send_if_modified(|current| {
            if !is_allowed_transition(current, &next) {
                rejected_from = Some(current.name());
                return false;
            }
            applied = true;
            if *current == next {
                return false;
            }
            *current = next;
            true
        });

        if let Some(from) = rejected_from {
            tracing::debug!(
                event = "transfer_state_transition_rejected",
                from,
                to = next_name
            );
        }
        applied
    }

    pub fn reset(&self) {
        self.sender.send_replace(TransferState::Idle);
    }

    /// Clears a finished session so a new one can start from `Idle`.
    pub fn begin_session(&self) {
        self.reset();
        self.set(TransferState::Connecting);
    }

    pub fn subscribe(&self) -> TransferStateSubscription {
        let mut receiver = self.sender.subscribe();
        receiver.mark_changed();
        TransferStateSubscription { receiver }
    }
}

/// Observer handle. The first [`TransferStateSubscription::changed`] resolves at once
/// with the value current at subscription time.
#[derive(Debug, Clone)]
pub struct TransferStateSubscription {
    receiver: watch::Receiver<TransferState>,
}

impl TransferStateSubscription {
    /// Waits for the next unseen value. `None` once the state machine is gone.
    pub async fn changed(&mut self) -> Option<TransferState> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until `predicate` holds for the current value.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> Option<TransferState>
    where
        F: FnMut(&TransferState) -> bool,
    {
        self.receiver
            .wait_for(|state| predicate(state))
            .await
            .ok()
            .map(|state| state.clone())
    }
}

#[cfg(test)]
#[path = "../tests/transfer/state_tests.rs"]
mod tests;
