use std::io;
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;

use super::*;
use crate::ResultExt;
use crate::transport::{Connection, create_listener, send_file};
use crate::wire::ShareMessage;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Releases everything a sender session acquired, whichever way the session ends.
struct SenderSessionGuard {
    service: TransferService,
    control: Arc<SessionControl>,
}

impl Drop for SenderSessionGuard {
    fn drop(&mut self) {
        self.service.release_session(&self.control);
    }
}

/// One approved item with its local source.
struct OutgoingItem<'a> {
    local: &'a LocalMediaItem,
    shareable: &'a ShareableItem,
}

fn transferring(
    item: &ShareableItem,
    bytes_transferred: u64,
    total_bytes: u64,
    item_index: usize,
    total_items: usize,
) -> TransferState {
    TransferState::Transferring {
        item: item.clone(),
        bytes_transferred,
        total_bytes,
        item_index,
        total_items,
    }
}

impl TransferService {
    /// Runs a whole sender session on the calling thread. The outcome is published
    /// through the state machine only.
    pub fn start_sender_blocking(&self, items: Vec<LocalMediaItem>, session: SessionInfo) {
        let control = self.begin_session();
        self.keep_alive.start(SessionRole::Sender);
        let _guard = SenderSessionGuard {
            service: self.clone(),
            control: control.clone(),
        };
        tracing::info!(
            event = "transfer_sender_started",
            session_id = control.id(),
            item_count = items.len(),
            device_name = session.device_name.as_str()
        );

        match self.run_sender(&control, &items, &session) {
            Ok(()) => tracing::info!(
                event = "transfer_sender_finished",
                session_id = control.id()
            ),
            Err(error) => self.fail_session(&control, error),
        }
    }

    fn run_sender(
        &self,
        control: &Arc<SessionControl>,
        items: &[LocalMediaItem],
        session: &SessionInfo,
    ) -> AppResult<()> {
        let settings = self.settings();
        let offered = items
            .iter()
            .map(|item| self.media_source.describe(item))
            .collect::<AppResult<Vec<_>>>()?;
        control.ensure_not_canceled()?;

        let listener = create_listener(0)?;
        let port = listener
            .local_addr()
            .and_then(|address| listener.set_nonblocking(true).map(|_| address.port()))
            .context("prepare sender listener")
            .with_code(FailureKind::Connection.code(), "Could not open a port for sharing")?;
        control.store_listener(listener);

        self.register_session(control, port, session)?;
        self.publish_tap_payload(control, session, port);

        self.set_state(
            control,
            TransferState::Offering {
                items: offered.clone(),
            },
        );
        self.set_state(control, TransferState::WaitingApproval);

        let socket = accept_receiver(control, settings.accept_timeout())?;
        let mut connection = Connection::new(socket, Self::connection_timeouts(&settings))?;
        tracing::info!(
            event = "transfer_receiver_connected",
            peer = connection.peer_label(),
            port
        );

        connection.send(&ShareMessage::offer(&offered))?;
        connection.set_read_timeout(Some(settings.approval_timeout()))?;
        let reply = {
            let _watch = control.watch(&connection)?;
            connection.receive()?
        };
        control.ensure_not_canceled()?;
        connection.set_read_timeout(Some(settings.io_timeout()))?;

        match reply {
            None => Err(FailureKind::Connection.error("Receiver disconnected")),
            Some(Err(malformed)) => {
                send_best_effort(&mut connection, &ShareMessage::Reject);
                Err(FailureKind::ProtocolViolation
                    .error("The receiver sent an invalid reply")
                    .with_context("reason", malformed.reason))
            }
            Some(Ok(ShareMessage::Reject)) => {
                Err(FailureKind::PeerDeclined.error("Receiver declined"))
            }
            Some(Ok(ShareMessage::Approve { ids })) => {
                let outgoing = items
                    .iter()
                    .zip(offered.iter())
                    .filter(|(_, shareable)| ids.contains(&shareable.id))
                    .map(|(local, shareable)| OutgoingItem { local, shareable })
                    .collect::<Vec<_>>();
                self.stream_items(control, connection, &outgoing, &settings)
            }
            Some(Ok(other)) => {
                send_best_effort(&mut connection, &ShareMessage::error("Unexpected message"));
                Err(FailureKind::ProtocolViolation
                    .error("Unexpected message")
                    .with_context("messageType", other.kind().as_str()))
            }
        }
    }

    fn stream_items(
        &self,
        control: &Arc<SessionControl>,
        mut connection: Connection,
        outgoing: &[OutgoingItem<'_>],
        settings: &TransferSettings,
    ) -> AppResult<()> {
        if outgoing.is_empty() {
            send_best_effort(&mut connection, &ShareMessage::error("No items approved"));
            return Err(FailureKind::NoItemsApproved.error("No items approved"));
        }

        let total_items = outgoing.len();
        for (index, item) in outgoing.iter().enumerate() {
            control.ensure_not_canceled()?;
            let shareable = item.shareable;
            let mut source = self.media_source.open(item.local)?;

            connection.send(&ShareMessage::file_start(shareable))?;
            self.set_state(
                control,
                transferring(shareable, 0, shareable.size_bytes, index, total_items),
            );
            send_file(
                connection.writer(),
                source.as_mut(),
                shareable,
                settings.chunk_size(),
                |sent, total| {
                    self.set_state(
                        control,
                        transferring(shareable, sent, total, index, total_items),
                    )
                },
            )?;
            tracing::debug!(
                event = "transfer_item_sent",
                item_id = shareable.id.as_str(),
                size_bytes = shareable.size_bytes,
                item_index = index
            );
        }
        control.ensure_not_canceled()?;

        connection.send(&ShareMessage::Done)?;
        connection.close();
        self.set_state(control, TransferState::Done);
        Ok(())
    }
}

/// Waits for the single receiver this session serves, then closes the listener so
/// later dials are refused.
fn accept_receiver(control: &SessionControl, timeout: Duration) -> AppResult<TcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        control.ensure_not_canceled()?;
        let Some(accepted) = control.with_listener(|listener| listener.accept()) else {
            return Err(failure::canceled());
        };

        match accepted {
            Ok((socket, _)) => {
                control.close_listener();
                socket
                    .set_nonblocking(false)
                    .context("switch receiver socket to blocking")
                    .with_code(FailureKind::Connection.code(), "Connection setup failed")?;
                return Ok(socket);
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(FailureKind::Connection
                        .error("No receiver connected in time")
                        .with_context("timeoutMs", timeout.as_millis().to_string()));
                }
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => {
                return Err(FailureKind::Connection
                    .error("Could not accept the receiver")
                    .with_source(error));
            }
        }
    }
}

/// For messages sent on the way out of a failing session; the session error wins.
fn send_best_effort(connection: &mut Connection, message: &ShareMessage) {
    if let Err(error) = connection.send(message) {
        tracing::debug!(
            event = "transfer_message_send_skipped",
            message_type = message.kind().as_str(),
            error_code = error.code.as_str()
        );
    }
}
