use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::*;
use crate::transport::Connection;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Cancellation flag and the resources owned by one session.
///
/// Each `begin_session` installs a fresh control, so a session that was canceled or
/// superseded can only ever touch what it acquired itself.
#[derive(Debug)]
pub(super) struct SessionControl {
    id: u64,
    canceled: AtomicBool,
    registered: AtomicBool,
    tap_published: AtomicBool,
    listener: Mutex<Option<TcpListener>>,
    blocked_on: Mutex<Option<TcpStream>>,
}

impl SessionControl {
    pub(super) fn new() -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            canceled: AtomicBool::new(false),
            registered: AtomicBool::new(false),
            tap_published: AtomicBool::new(false),
            listener: Mutex::new(None),
            blocked_on: Mutex::new(None),
        }
    }

    pub(super) fn id(&self) -> u64 {
        self.id
    }

    pub(super) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    pub(super) fn ensure_not_canceled(&self) -> AppResult<()> {
        if self.is_canceled() {
            return Err(failure::canceled());
        }
        Ok(())
    }

    /// Marks the session canceled, closes its listener and unblocks a pending read.
    pub(super) fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.close_listener();
        self.interrupt();
    }

    pub(super) fn store_listener(&self, listener: TcpListener) {
        *lock_mutex(&self.listener, "session_listener") = Some(listener);
    }

    /// Closes the listener if it is still open. Returns whether one was closed.
    pub(super) fn close_listener(&self) -> bool {
        let closed = lock_mutex(&self.listener, "session_listener").take();
        if closed.is_some() {
            tracing::debug!(event = "transfer_listener_closed", session_id = self.id);
        }
        closed.is_some()
    }

    /// Runs `accept` against the open listener. `None` once the listener is closed.
    pub(super) fn with_listener<R>(&self, accept: impl FnOnce(&TcpListener) -> R) -> Option<R> {
        lock_mutex(&self.listener, "session_listener")
            .as_ref()
            .map(accept)
    }

    pub(super) fn mark_registered(&self) {
        self.registered.store(true, Ordering::SeqCst);
    }

    pub(super) fn take_registered(&self) -> bool {
        self.registered.swap(false, Ordering::SeqCst)
    }

    pub(super) fn mark_tap_published(&self) {
        self.tap_published.store(true, Ordering::SeqCst);
    }

    pub(super) fn take_tap_published(&self) -> bool {
        self.tap_published.swap(false, Ordering::SeqCst)
    }

    /// Registers `connection` as the socket a control read is about to block on, so
    /// [`SessionControl::cancel`] can shut it down. Payload streaming is never watched:
    /// cancel takes effect there between items.
    pub(super) fn watch(&self, connection: &Connection) -> AppResult<BlockingReadWatch<'_>> {
        let socket = connection.try_clone_socket()?;
        *lock_mutex(&self.blocked_on, "session_blocked_socket") = Some(socket);
        if self.is_canceled() {
            self.interrupt();
        }
        Ok(BlockingReadWatch { control: self })
    }

    fn interrupt(&self) {
        if let Some(socket) = lock_mutex(&self.blocked_on, "session_blocked_socket").take() {
            let _ = socket.shutdown(Shutdown::Both);
            tracing::debug!(event = "transfer_blocked_read_interrupted", session_id = self.id);
        }
    }
}

/// Unregisters the watched socket when the blocking read is over.
pub(super) struct BlockingReadWatch<'a> {
    control: &'a SessionControl,
}

impl Drop for BlockingReadWatch<'_> {
    fn drop(&mut self) {
        lock_mutex(&self.control.blocked_on, "session_blocked_socket").take();
    }
}

impl TransferService {
    /// Supersedes whatever session was running and installs a fresh control for the
    /// next one, with the state reset to `Connecting`.
    pub(super) fn begin_session(&self) -> Arc<SessionControl> {
        let next = Arc::new(SessionControl::new());
        {
            let mut current = lock_mutex(self.session.as_ref(), "transfer_session");
            if !current.is_canceled() {
                current.cancel();
            }
            self.release_locked(&current, true);
            *current = next.clone();
            self.state.begin_session();
        }
        self.clear_pending();
        tracing::debug!(event = "transfer_session_begun", session_id = next.id());
        next
    }

    /// Publishes `next` only while `control` is the live, uncanceled session.
    pub(super) fn set_state(&self, control: &Arc<SessionControl>, next: TransferState) {
        let current = lock_mutex(self.session.as_ref(), "transfer_session");
        if Arc::ptr_eq(&*current, control) && !control.is_canceled() {
            self.state.set(next);
        }
    }

    pub(super) fn fail_session(&self, control: &Arc<SessionControl>, error: AppError) {
        if control.is_canceled() || failure::is_canceled(&error) {
            tracing::info!(
                event = "transfer_session_stopped",
                reason = "canceled",
                session_id = control.id()
            );
            return;
        }

        tracing::warn!(
            event = "transfer_session_failed",
            session_id = control.id(),
            error_code = error.code.as_str(),
            error_detail = error.message.as_str(),
            causes = ?error.redacted_causes(),
            kind = FailureKind::of(&error).map(|kind| kind.code()).unwrap_or("unclassified")
        );
        self.set_state(control, TransferState::error(error.message.clone()));
    }

    /// Registers the sender with discovery unless the session was canceled first.
    pub(super) fn register_session(
        &self,
        control: &Arc<SessionControl>,
        port: u16,
        session: &SessionInfo,
    ) -> AppResult<()> {
        let _current = lock_mutex(self.session.as_ref(), "transfer_session");
        control.ensure_not_canceled()?;
        control.mark_registered();
        self.discovery
            .register(port, &session.session_token, &session.device_name)
    }

    pub(super) fn publish_tap_payload(
        &self,
        control: &Arc<SessionControl>,
        session: &SessionInfo,
        port: u16,
    ) {
        if !self.tap_handoff.is_supported() {
            return;
        }
        let _current = lock_mutex(self.session.as_ref(), "transfer_session");
        if control.is_canceled() {
            return;
        }
        let info = SessionInfo {
            port,
            ..session.clone()
        };
        control.mark_tap_published();
        if let Err(error) = self.tap_handoff.set_push_payload(Some(&info)) {
            tracing::warn!(
                event = "transfer_tap_payload_publish_failed",
                error_code = error.code.as_str()
            );
        }
    }

    /// Gives back what `control` acquired. Keep-alive is shared, so it is only stopped
    /// while `control` is still the current session.
    pub(super) fn release_session(&self, control: &Arc<SessionControl>) {
        let current = lock_mutex(self.session.as_ref(), "transfer_session");
        self.release_locked(control, Arc::ptr_eq(&*current, control));
    }

    fn release_locked(&self, control: &SessionControl, is_current: bool) {
        control.close_listener();
        if control.take_registered() {
            self.discovery.unregister();
        }
        if control.take_tap_published() {
            if let Err(error) = self.tap_handoff.set_push_payload(None) {
                tracing::warn!(
                    event = "transfer_tap_payload_clear_failed",
                    error_code = error.code.as_str()
                );
            }
        }
        if is_current {
            self.keep_alive.stop();
        }
    }

    /// Cancels the current session: its listener closes, a blocked control read returns,
    /// and the state goes back to `Idle`.
    pub fn cancel_transfer(&self) {
        let session_id = {
            let current = lock_mutex(self.session.as_ref(), "transfer_session");
            current.cancel();
            self.release_locked(&current, true);
            self.state.set(TransferState::Idle);
            current.id()
        };
        self.clear_pending();
        tracing::info!(event = "transfer_canceled", session_id);
    }
}
