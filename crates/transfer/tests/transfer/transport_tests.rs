use super::*;
use std::io::Cursor;

/// Yields at most 1, 2, 3, 1, 2, 3, ... bytes per read call.
struct TrickleReader {
    data: Vec<u8>,
    position: usize,
    step: usize,
}

impl TrickleReader {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            position: 0,
            step: 0,
        }
    }
}

impl Read for TrickleReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.data.len() || buf.is_empty() {
            return Ok(0);
        }
        let size = (self.step % 3) + 1;
        self.step += 1;
        let end = (self.position + size)
            .min(self.data.len())
            .min(self.position + buf.len());
        let count = end - self.position;
        buf[..count].copy_from_slice(&self.data[self.position..end]);
        self.position = end;
        Ok(count)
    }
}

fn item(id: &str, size_bytes: u64) -> ShareableItem {
    ShareableItem {
        id: id.to_string(),
        title: "Clair de Lune".to_string(),
        artist: "Debussy".to_string(),
        album: None,
        size_bytes,
        mime_type: "audio/ogg".to_string(),
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|index| (index % 251) as u8).collect()
}

#[test]
fn send_line_should_terminate_with_newline() {
    let mut output = Vec::<u8>::new();
    send_line(&mut output, r#"{"type":"DONE"}"#).expect("send line");
    assert_eq!(output, b"{\"type\":\"DONE\"}\n");
}

#[test]
fn receive_line_should_split_lines_and_report_eof() {
    let mut reader = Cursor::new(b"first\r\nsecond\nlast".to_vec());
    assert_eq!(
        receive_line(&mut reader).expect("line 1").as_deref(),
        Some("first")
    );
    assert_eq!(
        receive_line(&mut reader).expect("line 2").as_deref(),
        Some("second")
    );
    assert_eq!(
        receive_line(&mut reader).expect("line 3").as_deref(),
        Some("last")
    );
    assert_eq!(receive_line(&mut reader).expect("eof"), None);
}

#[test]
fn receive_line_should_leave_following_bytes_in_reader() {
    let mut payload = b"{\"type\":\"FILE_START\",\"id\":\"a\",\"sizeBytes\":3}\n".to_vec();
    payload.extend_from_slice(&[1, 2, 3]);
    let mut reader = std::io::BufReader::new(TrickleReader::new(payload));

    let line = receive_line(&mut reader)
        .expect("read header")
        .expect("header present");
    assert!(line.starts_with("{\"type\":\"FILE_START\""));

    let mut rest = Vec::<u8>::new();
    receive_file(&mut reader, &mut rest, 3, 8, |_, _| {}).expect("read body");
    assert_eq!(rest, vec![1, 2, 3]);
}

#[test]
fn receive_line_should_reject_oversized_line() {
    let mut reader = Cursor::new(vec![b'a'; MAX_LINE_BYTES + 10]);
    let error = receive_line(&mut reader).expect_err("oversized line");
    assert_eq!(error.code, FailureKind::ProtocolViolation.code());
}

#[test]
fn receive_file_should_write_exact_size_from_partial_reads() {
    let data = pattern(1_000);
    let mut with_trailer = data.clone();
    with_trailer.extend_from_slice(b"{\"type\":\"DONE\"}\n");
    let mut reader = TrickleReader::new(with_trailer);
    let mut dest = Vec::<u8>::new();
    let mut calls = Vec::new();

    let received = receive_file(&mut reader, &mut dest, 1_000, 8 * 1024, |done, total| {
        calls.push((done, total))
    })
    .expect("receive file");

    assert_eq!(received, 1_000);
    assert_eq!(dest, data);
    assert!(calls.len() >= 1_000 / 3);
    assert_eq!(calls.last(), Some(&(1_000, 1_000)));
    assert!(calls.windows(2).all(|pair| pair[0].0 < pair[1].0));
}

#[test]
fn receive_file_should_fail_when_stream_ends_early() {
    let mut reader = Cursor::new(pattern(10));
    let mut dest = Vec::<u8>::new();
    let error = receive_file(&mut reader, &mut dest, 20, 4, |_, _| {}).expect_err("short body");
    assert_eq!(error.code, FailureKind::Io.code());
    assert_eq!(error.context_value("receivedBytes"), Some("10"));
    assert_eq!(dest.len(), 10);
}

#[test]
fn send_file_should_stream_in_chunks_with_progress() {
    let data = pattern(20_000);
    let mut source = Cursor::new(data.clone());
    let mut output = Vec::<u8>::new();
    let mut calls = Vec::new();

    let sent = send_file(
        &mut output,
        &mut source,
        &item("a", 20_000),
        8 * 1024,
        |done, total| calls.push((done, total)),
    )
    .expect("send file");

    assert_eq!(sent, 20_000);
    assert_eq!(output, data);
    assert_eq!(calls, vec![(8_192, 20_000), (16_384, 20_000), (20_000, 20_000)]);
}

#[test]
fn send_file_should_fill_chunks_from_trickling_source() {
    let data = pattern(50);
    let mut source = TrickleReader::new(data.clone());
    let mut output = Vec::<u8>::new();
    let mut calls = 0;

    send_file(&mut output, &mut source, &item("a", 50), 16, |_, _| calls += 1)
        .expect("send file");

    assert_eq!(output, data);
    assert_eq!(calls, 4);
}

#[test]
fn send_file_should_fail_on_short_source() {
    let mut source = Cursor::new(pattern(5));
    let mut output = Vec::<u8>::new();
    let error = send_file(&mut output, &mut source, &item("a", 9), 4, |_, _| {})
        .expect_err("short source");
    assert_eq!(error.code, FailureKind::Io.code());
    assert_eq!(error.context_value("itemId"), Some("a"));
}

#[test]
fn zero_length_transfer_should_report_progress_once() {
    let mut calls = Vec::new();
    send_file(
        &mut Vec::<u8>::new(),
        &mut Cursor::new(Vec::<u8>::new()),
        &item("empty", 0),
        8,
        |done, total| calls.push((done, total)),
    )
    .expect("send empty");
    receive_file(&mut Cursor::new(Vec::<u8>::new()), &mut Vec::<u8>::new(), 0, 8, |done, total| {
        calls.push((done, total))
    })
    .expect("receive empty");
    assert_eq!(calls, vec![(0, 0), (0, 0)]);
}

#[test]
fn connection_should_exchange_messages_over_loopback() {
    let listener = create_listener(0).expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();

    let server = std::thread::spawn(move || {
        let (socket, _) = listener.accept().expect("accept");
        let mut connection =
            Connection::new(socket, ConnectionTimeouts::default()).expect("server connection");
        connection
            .send(&ShareMessage::Reject)
            .expect("send reject");
        connection.receive().expect("receive reply")
    });

    let socket = connect("127.0.0.1", port, Duration::from_secs(5)).expect("connect");
    let mut client = Connection::new(
        socket,
        ConnectionTimeouts {
            read: Some(Duration::from_secs(5)),
            write: Some(Duration::from_secs(5)),
        },
    )
    .expect("client connection");
    let first = client.receive().expect("receive").expect("line");
    assert_eq!(first, Ok(ShareMessage::Reject));
    client.send(&ShareMessage::Done).expect("send done");
    client.close();

    let reply = server.join().expect("server join");
    assert_eq!(reply, Some(Ok(ShareMessage::Done)));
}

#[test]
fn connect_should_map_refused_port_to_connection_failure() {
    let listener = create_listener(0).expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);

    let error = connect("127.0.0.1", port, Duration::from_secs(2)).expect_err("refused");
    assert_eq!(error.code, FailureKind::Connection.code());
    assert!(error.context_value("peerAddress").is_some());
}

#[test]
fn read_timeout_should_map_to_connection_failure() {
    let listener = create_listener(0).expect("bind listener");
    let port = listener.local_addr().expect("local addr").port();
    let _server = std::thread::spawn(move || {
        let accepted = listener.accept();
        std::thread::sleep(Duration::from_millis(500));
        drop(accepted);
    });

    let socket = connect("127.0.0.1", port, Duration::from_secs(2)).expect("connect");
    let mut client = Connection::new(
        socket,
        ConnectionTimeouts {
            read: Some(Duration::from_millis(50)),
            write: None,
        },
    )
    .expect("client connection");
    let error = client.receive().expect_err("silent peer");
    assert_eq!(error.code, FailureKind::Connection.code());
}
