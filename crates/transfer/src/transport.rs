//! Blocking line and byte-stream I/O over TCP.
//!
//! Nothing here knows the message vocabulary except [`Connection::send`] and
//! [`Connection::receive`], which pair the line functions with [`crate::wire`].

use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{
    IpAddr, Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket,
};
use std::time::Duration;

use anyhow::Context;

use crate::failure::FailureKind;
use crate::models::ShareableItem;
use crate::wire::{self, MAX_LINE_BYTES, MalformedMessage, ShareMessage};
use crate::{AppError, AppResult, ResultExt};

pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

fn is_timeout(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Maps a socket error to the session taxonomy: timeouts are connection failures, the
/// rest are mid-transfer I/O failures.
pub(crate) fn stream_error(error: io::Error, operation: &'static str) -> AppError {
    let app_error = if is_timeout(&error) {
        FailureKind::Connection.error("The other device stopped responding")
    } else {
        FailureKind::Io.error("Connection interrupted")
    };
    app_error
        .with_context("operation", operation)
        .with_source(error)
}

/// Writes `line` plus a newline terminator and flushes.
pub fn send_line<W: Write>(writer: &mut W, line: &str) -> AppResult<()> {
    let mut write_line = || -> io::Result<()> {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    };
    write_line().map_err(|error| stream_error(error, "send_line"))
}

/// Reads one line, blocking until it arrives. `None` means the peer closed the stream.
///
/// The terminator is stripped. Lines longer than [`MAX_LINE_BYTES`] are a protocol
/// violation; invalid UTF-8 is replaced so that `wire::decode` reports it as malformed.
pub fn receive_line<R: BufRead>(reader: &mut R) -> AppResult<Option<String>> {
    let mut buffer = Vec::new();
    let limit = MAX_LINE_BYTES as u64 + 1;
    let read = reader
        .by_ref()
        .take(limit)
        .read_until(b'\n', &mut buffer)
        .map_err(|error| stream_error(error, "receive_line"))?;
    if read == 0 {
        return Ok(None);
    }

    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    } else if buffer.len() > MAX_LINE_BYTES {
        return Err(
            FailureKind::ProtocolViolation.error("The other device sent an oversized message")
        );
    }

    Ok(Some(String::from_utf8_lossy(&buffer).into_owned()))
}

/// Dials `host:port`, trying every resolved address before giving up.
pub fn connect(host: &str, port: u16, timeout: Duration) -> AppResult<TcpStream> {
    let address = format!("{host}:{port}");
    let candidates = (host, port)
        .to_socket_addrs()
        .with_context(|| format!("resolve {address}"))
        .with_code(
            FailureKind::Connection.code(),
            "Could not reach the other device",
        )
        .with_ctx("peerAddress", address.clone())?;

    let mut last_error: Option<io::Error> = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                tracing::debug!(event = "transfer_connected", peer = %candidate);
                return Ok(stream);
            }
            Err(error) => {
                tracing::debug!(
                    event = "transfer_connect_attempt_failed",
                    peer = %candidate,
                    error = error.to_string()
                );
                last_error = Some(error);
            }
        }
    }

    let error = last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")
    });
    Err(
        FailureKind::Connection
            .error("Could not reach the other device")
            .with_context("peerAddress", address)
            .with_source(error),
    )
}

/// Binds on all interfaces. Port 0 asks the OS for an ephemeral port.
pub fn create_listener(port: u16) -> AppResult<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .with_context(|| format!("bind 0.0.0.0:{port}"))
        .with_code(
            FailureKind::Connection.code(),
            "Could not open a port for sharing",
        )
        .with_ctx("port", port.to_string())
}

/// Address of the interface that routes off-host. No packet is sent.
pub fn local_ip() -> AppResult<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .context("bind socket for address detection")
        .with_code(FailureKind::Connection.code(), "Could not detect the local address")?;
    socket
        .connect("8.8.8.8:80")
        .context("route socket for address detection")
        .with_code(FailureKind::Connection.code(), "Could not detect the local address")?;
    let address = socket
        .local_addr()
        .context("read detected local address")
        .with_code(FailureKind::Connection.code(), "Could not detect the local address")?;
    Ok(address.ip())
}

fn fill_chunk<R: Read + ?Sized>(source: &mut R, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match source.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(read) => filled += read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
    Ok(filled)
}

/// Streams exactly `item.size_bytes` bytes from `source` in `chunk_size` blocks, calling
/// `on_progress(sent, total)` after each block.
pub fn send_file<W, R, F>(
    writer: &mut W,
    source: &mut R,
    item: &ShareableItem,
    chunk_size: usize,
    mut on_progress: F,
) -> AppResult<u64>
where
    W: Write,
    R: Read + ?Sized,
    F: FnMut(u64, u64),
{
    let total = item.size_bytes;
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut sent = 0u64;
    if total == 0 {
        on_progress(0, 0);
    }

    while sent < total {
        let want = (total - sent).min(buffer.len() as u64) as usize;
        let read = fill_chunk(source, &mut buffer[..want])
            .with_context(|| format!("read source of item {}", item.id))
            .with_code(FailureKind::Io.code(), "Could not read the media file")
            .with_ctx("itemId", item.id.clone())?;
        if read == 0 {
            return Err(FailureKind::Io
                .error("The media file is shorter than announced")
                .with_context("itemId", item.id.clone())
                .with_context("sentBytes", sent.to_string())
                .with_context("totalBytes", total.to_string()));
        }

        writer
            .write_all(&buffer[..read])
            .map_err(|error| stream_error(error, "send_file"))?;
        sent += read as u64;
        on_progress(sent, total);
    }

    writer
        .flush()
        .map_err(|error| stream_error(error, "send_file_flush"))?;
    Ok(sent)
}

/// Reads exactly `expected_size` bytes into `dest`, whatever the size of each underlying
/// read, calling `on_progress(received, total)` after every read.
pub fn receive_file<R, W, F>(
    reader: &mut R,
    dest: &mut W,
    expected_size: u64,
    chunk_size: usize,
    mut on_progress: F,
) -> AppResult<u64>
where
    R: Read,
    W: Write + ?Sized,
    F: FnMut(u64, u64),
{
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut received = 0u64;
    if expected_size == 0 {
        on_progress(0, 0);
    }

    while received < expected_size {
        let want = (expected_size - received).min(buffer.len() as u64) as usize;
        let read = match reader.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(FailureKind::Io
                    .error("Connection closed before the file finished")
                    .with_context("receivedBytes", received.to_string())
                    .with_context("expectedBytes", expected_size.to_string()));
            }
            Ok(read) => read,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(stream_error(error, "receive_file")),
        };

        dest.write_all(&buffer[..read])
            .context("write received bytes")
            .with_code(FailureKind::Io.code(), "Could not save the received file")?;
        received += read as u64;
        on_progress(received, expected_size);
    }

    dest.flush()
        .context("flush received file")
        .with_code(FailureKind::Io.code(), "Could not save the received file")?;
    Ok(received)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionTimeouts {
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

/// One duplex TCP stream with its buffered reader and writer.
///
/// Bytes that follow a control line must be read through [`Connection::reader`], since
/// the buffered reader may already hold some of them.
#[derive(Debug)]
pub struct Connection {
    socket: TcpStream,
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer: Option<SocketAddr>,
}

impl Connection {
    pub fn new(socket: TcpStream, timeouts: ConnectionTimeouts) -> AppResult<Self> {
        let peer = socket.peer_addr().ok();
        socket
            .set_read_timeout(timeouts.read)
            .and_then(|_| socket.set_write_timeout(timeouts.write))
            .context("apply socket timeouts")
            .with_code(FailureKind::Connection.code(), "Connection setup failed")?;
        let reader = socket
            .try_clone()
            .context("clone socket for reading")
            .with_code(FailureKind::Connection.code(), "Connection setup failed")?;
        let writer = socket
            .try_clone()
            .context("clone socket for writing")
            .with_code(FailureKind::Connection.code(), "Connection setup failed")?;

        Ok(Self {
            socket,
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            peer,
        })
    }

    pub fn peer_label(&self) -> String {
        self.peer
            .map(|value| value.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// A second handle on the socket, for shutting it down from another thread.
    pub fn try_clone_socket(&self) -> AppResult<TcpStream> {
        self.socket
            .try_clone()
            .context("clone socket handle")
            .with_code(FailureKind::Connection.code(), "Connection setup failed")
    }

    pub fn reader(&mut self) -> &mut BufReader<TcpStream> {
        &mut self.reader
    }

    pub fn writer(&mut self) -> &mut BufWriter<TcpStream> {
        &mut self.writer
    }

    /// Overrides the read timeout for the next reads; `None` blocks indefinitely.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> AppResult<()> {
        self.socket
            .set_read_timeout(timeout)
            .context("update read timeout")
            .with_code(FailureKind::Connection.code(), "Connection setup failed")
    }

    pub fn send(&mut self, message: &ShareMessage) -> AppResult<()> {
        let line = wire::encode(message)?;
        send_line(&mut self.writer, &line)?;
        tracing::debug!(
            event = "transfer_message_sent",
            message_type = message.kind().as_str(),
            peer = self.peer_label()
        );
        Ok(())
    }

    /// Next control message. `Ok(None)` on a closed stream, `Ok(Some(Err(..)))` when the
    /// line did not decode.
    pub fn receive(&mut self) -> AppResult<Option<Result<ShareMessage, MalformedMessage>>> {
        let Some(line) = receive_line(&mut self.reader)? else {
            return Ok(None);
        };
        let decoded = wire::decode(&line);
        match &decoded {
            Ok(message) => tracing::debug!(
                event = "transfer_message_received",
                message_type = message.kind().as_str(),
                peer = self.peer_label()
            ),
            Err(malformed) => tracing::warn!(
                event = "transfer_message_malformed",
                reason = malformed.reason.as_str(),
                peer = self.peer_label()
            ),
        }
        Ok(Some(decoded))
    }

    /// Flushes pending output and shuts both directions down. Errors are ignored since
    /// the peer may already be gone.
    pub fn close(mut self) {
        let _ = self.writer.flush();
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
#[path = "../tests/transfer/transport_tests.rs"]
mod tests;
