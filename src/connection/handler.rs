//! Connection Handler Module
//!
//! This module handles individual client connections to redlite.
//! Each client gets its own handler task that runs in a loop,
//! reading requests and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Parse buffered request  │◄├──── read more bytes if incomplete
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Encode + send reply     │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects, framing error or I/O error
//!        │
//!        ▼
//! 5. Handler task ends
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut`. TCP is a stream protocol, so a
//! read may hold half a request or several pipelined ones. The parser runs
//! over a `Cursor` on the buffered bytes; on success the consumed prefix is
//! dropped, and if it only ran out of input the handler reads more and
//! starts over. A bulk string cut short reports how many payload bytes are
//! missing, so the handler skips reparsing until at least that many arrive.
//!
//! A framing error leaves the stream position unknown, so the connection is
//! closed without a reply. A command error is just a reply.

use crate::commands::CommandHandler;
use crate::protocol::{self, EncodeError, ParseError, RespParser, RespValue};
use bytes::{Buf, BytesMut};
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default cap on bytes buffered for a single unfinished request (64 MB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Per-connection limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Maximum array nesting accepted from the client
    pub max_nesting_depth: usize,
    /// Maximum bytes buffered while waiting for a request to complete
    pub max_buffer_size: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_nesting_depth: protocol::parser::DEFAULT_MAX_DEPTH,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
///
/// Generic over the transport so the same loop serves a `TcpStream` in
/// production and an in-memory mock in tests.
pub struct ConnectionHandler<S> {
    /// The client stream, write side buffered
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared storage behind it)
    command_handler: CommandHandler,

    parser: RespParser,

    max_buffer_size: usize,

    /// Buffer length below which the pending request cannot be complete
    min_request_len: usize,

    /// Parser runs spent on the request at the front of the buffer
    parse_passes: u64,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The client stream
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `stats` - Shared connection statistics
    /// * `limits` - Nesting and buffering limits for this client
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        limits: ConnectionLimits,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::with_max_depth(limits.max_nesting_depth),
            max_buffer_size: limits.max_buffer_size,
            min_request_len: 0,
            parse_passes: 0,
            stats,
        }
    }

    /// Runs the main connection loop until the client goes away or the
    /// connection has to be dropped.
    ///
    /// A clean close between requests is reported as
    /// [`ConnectionError::ClientDisconnected`].
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete request already buffered (pipelining)
            while let Some(request) = self.try_parse_request()? {
                let reply = self.command_handler.execute(request);
                self.stats.command_processed();

                self.send_reply(&reply).await?;
            }

            self.read_more_data().await?;
        }
    }

    /// Attempts to parse one request from the front of the buffer.
    ///
    /// Returns `Ok(None)` when the buffered bytes end before the request
    /// does. A bulk string cut short records how many bytes it still needs,
    /// and the parser is not rerun until they have arrived.
    fn try_parse_request(&mut self) -> Result<Option<RespValue>, ConnectionError> {
        if self.buffer.is_empty() || self.buffer.len() < self.min_request_len {
            return Ok(None);
        }

        self.parse_passes += 1;
        let mut cursor = Cursor::new(&self.buffer[..]);
        match self.parser.parse(&mut cursor) {
            Ok(value) => {
                let consumed = cursor.position() as usize;
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    passes = self.parse_passes,
                    remaining = self.buffer.len(),
                    "Parsed request"
                );
                self.min_request_len = 0;
                self.parse_passes = 0;
                Ok(Some(value))
            }
            Err(ParseError::Length { expected, actual }) => {
                // Payload bytes still missing, plus its CRLF
                self.min_request_len = self.buffer.len() + (expected - actual) + 2;
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    needed = self.min_request_len,
                    "Incomplete bulk string, need more data"
                );
                Ok(None)
            }
            Err(e) if e.is_incomplete() => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete request, need more data"
                );
                Ok(None)
            }
            Err(e) => {
                warn!(client = %self.addr, error = %e, "Framing error, closing connection");
                Err(ConnectionError::Parse(e))
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= self.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                max = self.max_buffer_size,
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            }
            // Peer closed with a partial request buffered
            return Err(ConnectionError::UnexpectedEof);
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Encodes a reply and flushes it to the client.
    async fn send_reply(&mut self, reply: &RespValue) -> Result<(), ConnectionError> {
        let mut bytes = Vec::with_capacity(64);
        if let Err(e) = protocol::write(&mut bytes, reply) {
            error!(client = %self.addr, error = %e, "Failed to encode reply");
            return Err(e.into());
        }

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent reply"
        );
        Ok(())
    }
}

/// Errors that can end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The client sent bytes that are not valid RESP
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A reply could not be encoded
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    /// Client disconnected between requests
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Client disconnected in the middle of a request
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. Ordinary
/// disconnects are not reported.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    limits: ConnectionLimits,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, limits);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    async fn run_mock(
        mock: tokio_test::io::Mock,
        limits: ConnectionLimits,
    ) -> (Result<(), ConnectionError>, Arc<ConnectionStats>) {
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            mock,
            test_addr(),
            CommandHandler::new(storage),
            Arc::clone(&stats),
            limits,
        );
        (handler.run().await, stats)
    }

    #[tokio::test]
    async fn test_empty_input_closes_without_reply() {
        let mock = Builder::new().build();

        let (result, stats) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nPI")
            .read(b"NG\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_pipelined_requests_answered_in_order() {
        let mock = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n*2\r\n$4\r\nECHO\r\n$3\r\nhey\r\n")
            .write(b"+OK\r\n")
            .write(b"$3\r\nbar\r\n")
            .write(b"$3\r\nhey\r\n")
            .build();

        let (result, stats) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_command_error_keeps_connection_open() {
        let mock = Builder::new()
            .read(b"*1\r\n:5\r\n")
            .write(b"-ERR protocol error: expected bulk string argument, got integer\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, _) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
    }

    #[tokio::test]
    async fn test_unknown_command_with_line_breaks_gets_reply() {
        let mock = Builder::new()
            .read(b"*1\r\n$4\r\nA\r\nB\r\n")
            .write(b"-ERR unknown command 'A\\r\\nB'\r\n")
            .read(b"*1\r\n$4\r\nPING\r\n")
            .write(b"+PONG\r\n")
            .build();

        let (result, stats) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_chunked_bulk_string_is_not_reparsed_per_chunk() {
        let payload_len = 1024 * 1024;
        let mut request =
            format!("*3\r\n$3\r\nSET\r\n$3\r\nbig\r\n${}\r\n", payload_len).into_bytes();
        request.extend(std::iter::repeat(b'x').take(payload_len));
        request.extend_from_slice(b"\r\n");

        let mut handler = ConnectionHandler::new(
            Builder::new().build(),
            test_addr(),
            CommandHandler::new(Arc::new(StorageEngine::new())),
            Arc::new(ConnectionStats::new()),
            ConnectionLimits::default(),
        );

        let mut chunks = request.chunks(4096).peekable();
        while let Some(chunk) = chunks.next() {
            handler.buffer.extend_from_slice(chunk);
            let parsed = handler.try_parse_request().unwrap();
            if chunks.peek().is_some() {
                assert!(parsed.is_none());
                assert_eq!(handler.parse_passes, 1);
            } else {
                let items = parsed.and_then(RespValue::into_array).unwrap();
                assert_eq!(items[2].as_bytes().map(<[u8]>::len), Some(payload_len));
            }
        }

        assert!(handler.buffer.is_empty());
        assert_eq!(handler.min_request_len, 0);
    }

    #[test]
    fn test_parse_passes_bounded_for_chunked_bulk_string() {
        let mut handler = ConnectionHandler::new(
            Builder::new().build(),
            test_addr(),
            CommandHandler::new(Arc::new(StorageEngine::new())),
            Arc::new(ConnectionStats::new()),
            ConnectionLimits::default(),
        );

        handler.buffer.extend_from_slice(b"$65536\r\n");
        for _ in 0..64 {
            handler.buffer.extend_from_slice(&[b'y'; 1024]);
            assert!(handler.try_parse_request().unwrap().is_none());
        }
        // Only the first chunk ran the parser; the rest waited for the CRLF
        assert_eq!(handler.parse_passes, 1);

        handler.buffer.extend_from_slice(b"\r\n");
        let value = handler.try_parse_request().unwrap().unwrap();
        assert_eq!(value.as_bytes().map(<[u8]>::len), Some(65536));
        assert_eq!(handler.parse_passes, 0);
    }

    #[tokio::test]
    async fn test_framing_error_closes_without_reply() {
        let mock = Builder::new().read(b"!oops\r\n").build();

        let (result, stats) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(
            result,
            Err(ConnectionError::Parse(ParseError::UnknownType(b'!')))
        ));
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_eof_inside_request() {
        let mock = Builder::new().read(b"*2\r\n$3\r\nGET\r\n$3\r\nfo").build();

        let (result, _) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_nesting_limit_applies() {
        let limits = ConnectionLimits {
            max_nesting_depth: 2,
            ..ConnectionLimits::default()
        };
        let mock = Builder::new().read(b"*1\r\n*1\r\n*1\r\n:1\r\n").build();

        let (result, _) = run_mock(mock, limits).await;

        assert!(matches!(
            result,
            Err(ConnectionError::Parse(ParseError::NestingTooDeep { max: 2 }))
        ));
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let limits = ConnectionLimits {
            max_buffer_size: 8,
            ..ConnectionLimits::default()
        };
        let mock = Builder::new().read(b"$100\r\nxxxxxxxxxx").build();

        let (result, _) = run_mock(mock, limits).await;

        assert!(matches!(result, Err(ConnectionError::BufferFull)));
    }

    #[tokio::test]
    async fn test_read_error_is_reported() {
        let mock = Builder::new()
            .read_error(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            ))
            .build();

        let (result, _) = run_mock(mock, ConnectionLimits::default()).await;

        assert!(matches!(result, Err(ConnectionError::Io(_))));
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    handler,
                    stats,
                    ConnectionLimits::default(),
                ));
            }
        });

        (addr, storage, stats)
    }

    /// Reads until `expected_len` bytes arrived or two seconds passed.
    async fn read_exactly(client: &mut TcpStream, expected_len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; expected_len];
        tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            client.read_exact(&mut buf),
        )
        .await
        .expect("timed out waiting for reply")
        .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();

        assert_eq!(read_exactly(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_set_get() {
        let (addr, storage, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();
        assert_eq!(read_exactly(&mut client, 10).await, b"$4\r\nAriz\r\n");

        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_writes_visible_across_connections() {
        let (addr, _, _) = create_test_server().await;

        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();

        writer
            .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nvalue\r\n")
            .await
            .unwrap();
        assert_eq!(read_exactly(&mut writer, 5).await, b"+OK\r\n");

        reader
            .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        assert_eq!(read_exactly(&mut reader, 11).await, b"$5\r\nvalue\r\n");
    }

    #[tokio::test]
    async fn test_framing_error_closes_socket() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"?garbage\r\n").await.unwrap();

        let mut buf = [0u8; 16];
        let n = tokio::time::timeout(
            tokio::time::Duration::from_secs(2),
            client.read(&mut buf),
        )
        .await
        .expect("server did not close the connection")
        .unwrap_or(0);
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
        let _ = read_exactly(&mut client, 7).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
