use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use kernel::runtime::run_blocking;
use tokio::sync::broadcast;

use crate::discovery::{Discovery, DiscoveryStream};
use crate::failure::{self, FailureKind};
use crate::handoff::TapHandoff;
use crate::keep_alive::KeepAliveService;
use crate::locks::{lock_mutex, read_lock, write_lock};
use crate::media::{MediaSink, MediaSource};
use crate::models::{LocalMediaItem, SessionInfo, SessionRole, ShareableItem, TransferState};
use crate::settings::{TransferSettings, TransferUpdateSettingsInput};
use crate::state::{TransferStateMachine, TransferStateSubscription};
use crate::transport::{self, ConnectionTimeouts};
use crate::wire::generate_session_token;
use crate::{AppError, AppResult};

mod receiver;
mod sender;
mod session_control;

use receiver::PendingReceiverConnection;
use session_control::SessionControl;

/// Everything the orchestrator delegates to the host platform.
#[derive(Clone)]
pub struct TransferCollaborators {
    pub discovery: Arc<dyn Discovery>,
    pub keep_alive: Arc<dyn KeepAliveService>,
    pub media_source: Arc<dyn MediaSource>,
    pub media_sink: Arc<dyn MediaSink>,
    pub tap_handoff: Arc<dyn TapHandoff>,
}

/// Starts and stops the keep-alive service at most once per session.
struct KeepAliveControl {
    service: Arc<dyn KeepAliveService>,
    active: AtomicBool,
}

impl KeepAliveControl {
    fn start(&self, role: SessionRole) {
        if !self.active.swap(true, Ordering::AcqRel) {
            self.service.start(role);
        }
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            self.service.stop();
        }
    }
}

/// Drives one sender or receiver session at a time and publishes its progress.
#[derive(Clone)]
pub struct TransferService {
    discovery: Arc<dyn Discovery>,
    media_source: Arc<dyn MediaSource>,
    media_sink: Arc<dyn MediaSink>,
    tap_handoff: Arc<dyn TapHandoff>,
    keep_alive: Arc<KeepAliveControl>,
    settings: Arc<RwLock<TransferSettings>>,
    state: TransferStateMachine,
    session: Arc<Mutex<Arc<SessionControl>>>,
    pending: Arc<Mutex<Option<PendingReceiverConnection>>>,
}

impl TransferService {
    pub fn new(settings: TransferSettings, collaborators: TransferCollaborators) -> Self {
        Self {
            discovery: collaborators.discovery,
            media_source: collaborators.media_source,
            media_sink: collaborators.media_sink,
            tap_handoff: collaborators.tap_handoff,
            keep_alive: Arc::new(KeepAliveControl {
                service: collaborators.keep_alive,
                active: AtomicBool::new(false),
            }),
            settings: Arc::new(RwLock::new(settings.clamped())),
            state: TransferStateMachine::new(),
            session: Arc::new(Mutex::new(Arc::new(SessionControl::new()))),
            pending: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> TransferSettings {
        read_lock(self.settings.as_ref(), "settings").clone()
    }

    /// Applies to sessions started afterwards.
    pub fn update_settings(
        &self,
        input: TransferUpdateSettingsInput,
    ) -> AppResult<TransferSettings> {
        let next = self.settings().with_update(input)?;
        *write_lock(self.settings.as_ref(), "settings") = next.clone();
        tracing::info!(
            event = "transfer_settings_updated",
            chunk_size_bytes = next.chunk_size_bytes,
            io_timeout_ms = next.io_timeout_ms
        );
        Ok(next)
    }

    pub fn subscribe(&self) -> TransferStateSubscription {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> TransferState {
        self.state.current()
    }

    pub fn discover(&self) -> AppResult<DiscoveryStream> {
        self.discovery.discover()
    }

    /// A fresh sender identity: this device's LAN address, a new token and the configured
    /// name. The port is filled in once the listener is bound.
    pub fn local_session_info(&self) -> SessionInfo {
        let host = transport::local_ip()
            .map(|value| value.to_string())
            .unwrap_or_else(|error| {
                tracing::warn!(
                    event = "transfer_local_ip_unavailable",
                    error_code = error.code.as_str()
                );
                "127.0.0.1".to_string()
            });
        SessionInfo {
            host,
            port: 0,
            session_token: generate_session_token(),
            device_name: self.settings().device_name,
        }
    }

    /// Enables tap reception and returns the stream of tapped sessions, when the platform
    /// supports it.
    pub fn enable_tap_receive(&self) -> AppResult<Option<broadcast::Receiver<SessionInfo>>> {
        if !self.tap_handoff.is_supported() {
            return Ok(None);
        }
        self.tap_handoff.enable_foreground_dispatch()?;
        Ok(self.tap_handoff.tap_events())
    }

    pub fn disable_tap_receive(&self) -> AppResult<()> {
        if !self.tap_handoff.is_supported() {
            return Ok(());
        }
        self.tap_handoff.disable_foreground_dispatch()
    }

    /// Declines a pending offer.
    pub fn reject_offer(&self) {
        match self.take_pending() {
            Some(pending) => {
                let control = pending.control.clone();
                pending.reject();
                self.set_state(&control, TransferState::Idle);
            }
            None => {
                self.state.set(TransferState::Idle);
            }
        }
    }

    pub async fn start_sender(&self, items: Vec<LocalMediaItem>, session: SessionInfo) {
        let service = self.clone();
        let joined = run_blocking("transfer_start_sender", move || {
            service.start_sender_blocking(items, session);
            Ok(())
        })
        .await;
        if let Err(error) = joined {
            self.fail_current(error);
        }
    }

    pub async fn connect_and_receive_offer(
        &self,
        session: SessionInfo,
    ) -> Option<Vec<ShareableItem>> {
        let service = self.clone();
        let joined = run_blocking("transfer_receive_offer", move || {
            Ok(service.connect_and_receive_offer_blocking(&session))
        })
        .await;
        match joined {
            Ok(items) => items,
            Err(error) => {
                self.fail_current(error);
                None
            }
        }
    }

    pub async fn approve_and_receive(&self, approved_ids: Vec<String>) {
        let service = self.clone();
        let joined = run_blocking("transfer_approve_and_receive", move || {
            service.approve_and_receive_blocking(&approved_ids);
            Ok(())
        })
        .await;
        if let Err(error) = joined {
            self.fail_current(error);
        }
    }

    /// For failures outside any session body, such as a worker that could not be joined.
    fn fail_current(&self, error: AppError) {
        let control = lock_mutex(self.session.as_ref(), "transfer_session").clone();
        self.fail_session(&control, error);
    }

    fn connection_timeouts(settings: &TransferSettings) -> ConnectionTimeouts {
        ConnectionTimeouts {
            read: Some(settings.io_timeout()),
            write: Some(settings.io_timeout()),
        }
    }

    fn store_pending(&self, pending: PendingReceiverConnection) {
        *lock_mutex(self.pending.as_ref(), "pending_connection") = Some(pending);
    }

    fn take_pending(&self) -> Option<PendingReceiverConnection> {
        lock_mutex(self.pending.as_ref(), "pending_connection").take()
    }

    fn clear_pending(&self) {
        if let Some(pending) = self.take_pending() {
            pending.close();
        }
    }
}

#[cfg(test)]
#[path = "../../tests/transfer/service_tests.rs"]
mod tests;
