use std::fs::{self, File};
use std::io;
use std::path::Path;

use anyhow::Context;

use super::*;
use crate::ResultExt;
use crate::transport::{Connection, connect, receive_file};
use crate::wire::ShareMessage;

/// An open connection holding an offer the user has not answered yet.
pub(super) struct PendingReceiverConnection {
    pub(super) control: Arc<SessionControl>,
    connection: Connection,
    offered_items: Vec<ShareableItem>,
}

impl PendingReceiverConnection {
    pub(super) fn reject(mut self) {
        if let Err(error) = self.connection.send(&ShareMessage::Reject) {
            tracing::warn!(
                event = "transfer_reject_send_failed",
                error_code = error.code.as_str()
            );
        }
        self.close();
    }

    pub(super) fn close(self) {
        self.connection.close();
    }
}

enum ItemHeader {
    Start { id: String, size_bytes: u64 },
    Skip(&'static str),
}

/// One announced item and its slot in the approved batch.
struct IncomingItem<'a> {
    item: &'a ShareableItem,
    size_bytes: u64,
    item_index: usize,
    total_items: usize,
}

impl IncomingItem<'_> {
    fn progress(&self, bytes_transferred: u64) -> TransferState {
        TransferState::Transferring {
            item: self.item.clone(),
            bytes_transferred,
            total_bytes: self.size_bytes,
            item_index: self.item_index,
            total_items: self.total_items,
        }
    }
}

impl TransferService {
    /// Dials the sender and waits for its offer. `None` leaves the reason in the state.
    pub fn connect_and_receive_offer_blocking(
        &self,
        session: &SessionInfo,
    ) -> Option<Vec<ShareableItem>> {
        let control = self.begin_session();
        tracing::info!(
            event = "transfer_receiver_connecting",
            session_id = control.id(),
            peer = session.address(),
            device_name = session.device_name.as_str()
        );

        match self.receive_offer(&control, session) {
            Ok(items) => Some(items),
            Err(error) => {
                self.fail_session(&control, error);
                None
            }
        }
    }

    fn receive_offer(
        &self,
        control: &Arc<SessionControl>,
        session: &SessionInfo,
    ) -> AppResult<Vec<ShareableItem>> {
        let settings = self.settings();
        let socket = connect(&session.host, session.port, settings.connect_timeout())?;
        control.ensure_not_canceled()?;
        let mut connection = Connection::new(socket, Self::connection_timeouts(&settings))?;

        let reply = {
            let _watch = control.watch(&connection)?;
            connection.receive()?
        };
        control.ensure_not_canceled()?;
        let items = match reply {
            None => return Err(FailureKind::Connection.error("The sender closed the connection")),
            Some(Err(malformed)) => {
                return Err(FailureKind::ProtocolViolation
                    .error("The sender sent an invalid offer")
                    .with_context("reason", malformed.reason));
            }
            Some(Ok(ShareMessage::Offer { items })) => items,
            Some(Ok(other)) => {
                return Err(FailureKind::ProtocolViolation
                    .error("The sender did not send an offer")
                    .with_context("messageType", other.kind().as_str()));
            }
        };

        tracing::info!(
            event = "transfer_offer_received",
            peer = connection.peer_label(),
            item_count = items.len()
        );
        self.store_pending(PendingReceiverConnection {
            control: control.clone(),
            connection,
            offered_items: items.clone(),
        });
        self.set_state(
            control,
            TransferState::Offering {
                items: items.clone(),
            },
        );
        Ok(items)
    }

    /// Answers the pending offer and receives the approved items in offer order.
    pub fn approve_and_receive_blocking(&self, approved_ids: &[String]) {
        let Some(pending) = self
            .take_pending()
            .filter(|pending| !pending.control.is_canceled())
        else {
            self.state.reset();
            self.state.set(TransferState::error("Connection lost"));
            return;
        };
        let control = pending.control.clone();

        let approved = pending
            .offered_items
            .iter()
            .filter(|item| approved_ids.contains(&item.id))
            .cloned()
            .collect::<Vec<_>>();
        if approved.is_empty() {
            tracing::info!(event = "transfer_offer_declined_empty_selection");
            pending.reject();
            self.set_state(&control, TransferState::Idle);
            return;
        }

        self.keep_alive.start(SessionRole::Receiver);
        let mut connection = pending.connection;
        let result = self.receive_items(&control, &mut connection, &approved);
        connection.close();
        match result {
            Ok(received) => {
                self.set_state(&control, TransferState::Done);
                tracing::info!(
                    event = "transfer_receiver_finished",
                    session_id = control.id(),
                    received_count = received,
                    approved_count = approved.len()
                );
            }
            Err(error) => self.fail_session(&control, error),
        }
        self.release_session(&control);
    }

    fn receive_items(
        &self,
        control: &Arc<SessionControl>,
        connection: &mut Connection,
        approved: &[ShareableItem],
    ) -> AppResult<usize> {
        let settings = self.settings();
        let ids = approved.iter().map(|item| item.id.clone()).collect();
        connection.send(&ShareMessage::Approve { ids })?;

        let total_items = approved.len();
        let mut received = 0usize;
        for index in 0..total_items {
            control.ensure_not_canceled()?;

            let header = {
                let _watch = control.watch(connection)?;
                read_item_header(connection)?
            };
            control.ensure_not_canceled()?;
            let (id, size_bytes) = match header {
                ItemHeader::Start { id, size_bytes } => (id, size_bytes),
                ItemHeader::Skip(reason) => {
                    tracing::warn!(event = "transfer_item_skipped", item_index = index, reason);
                    continue;
                }
            };

            let Some(item) = approved.iter().find(|candidate| candidate.id == id) else {
                tracing::warn!(
                    event = "transfer_item_unknown",
                    item_id = id.as_str(),
                    size_bytes
                );
                receive_file(
                    connection.reader(),
                    &mut io::sink(),
                    size_bytes,
                    settings.chunk_size(),
                    |_, _| {},
                )?;
                continue;
            };

            let incoming = IncomingItem {
                item,
                size_bytes,
                item_index: index,
                total_items,
            };
            let path = self.media_sink.prepare_destination(item, &settings)?;
            self.set_state(control, incoming.progress(0));
            self.receive_into(control, connection, &incoming, &path, settings.chunk_size())?;
            self.media_sink.item_received(item, &path);
            received += 1;
        }
        control.ensure_not_canceled()?;

        let trailer = {
            let _watch = control.watch(connection)?;
            connection.receive()?
        };
        match trailer {
            Some(Ok(ShareMessage::Done)) => {}
            Some(Ok(ShareMessage::Error { message })) => {
                return Err(FailureKind::ProtocolViolation.error(message));
            }
            _ => tracing::warn!(event = "transfer_done_missing"),
        }
        Ok(received)
    }

    /// Writes one item to `path`. A partially written file is removed on failure.
    fn receive_into(
        &self,
        control: &Arc<SessionControl>,
        connection: &mut Connection,
        incoming: &IncomingItem<'_>,
        path: &Path,
        chunk_size: usize,
    ) -> AppResult<()> {
        let mut file = File::create(path)
            .with_context(|| format!("create {}", path.display()))
            .with_code(FailureKind::Io.code(), "Could not save the received file")
            .with_ctx("itemId", incoming.item.id.clone())?;

        let written = receive_file(
            connection.reader(),
            &mut file,
            incoming.size_bytes,
            chunk_size,
            |bytes_transferred, _| self.set_state(control, incoming.progress(bytes_transferred)),
        );
        drop(file);

        if let Err(error) = written {
            if let Err(remove_error) = fs::remove_file(path) {
                tracing::warn!(
                    event = "transfer_partial_file_remove_failed",
                    path = %path.display(),
                    error = remove_error.to_string()
                );
            }
            return Err(error);
        }
        Ok(())
    }
}

/// Reads the next control line where a `FILE_START` is expected. A peer `ERROR` ends the
/// session; anything else only costs the current item slot.
fn read_item_header(connection: &mut Connection) -> AppResult<ItemHeader> {
    match connection.receive()? {
        None => Ok(ItemHeader::Skip("stream closed")),
        Some(Err(_)) => Ok(ItemHeader::Skip("malformed header")),
        Some(Ok(ShareMessage::FileStart { id, size_bytes })) => {
            Ok(ItemHeader::Start { id, size_bytes })
        }
        Some(Ok(ShareMessage::Error { message })) => {
            Err(FailureKind::ProtocolViolation.error(message))
        }
        Some(Ok(_)) => Ok(ItemHeader::Skip("unexpected message")),
    }
}
