//! # Connection Handler Module
//!
//! One [`Connection`] is created per accepted socket and run as its own
//! `tokio` task. It owns a buffered reader/writer pair over the split
//! halves of the stream and drives the per-connection state machine:
//!
//! ```text
//! START → READ_COMMAND → DISPATCH ─┬─► ENQUEUE_READ_LEN → ENQUEUE_READ_BODY → RESPOND → READ_COMMAND
//!                                  ├─► DEQUEUE → RESPOND → READ_COMMAND
//!                                  └─► LIST    → RESPOND → READ_COMMAND
//! READ_COMMAND (EOF or shutdown) → CLOSE
//! ENQUEUE_READ_* (EOF or error)  → CLOSE
//! ```
//!
//! It owns no queue data itself; every operation is dispatched to the
//! shared [`QueueRegistry`]. The dispatch loop itself (`run_loop`) is
//! generic over any buffered async reader/writer pair so it can be driven
//! by a real split `TcpStream` in production and by an in-memory duplex
//! pipe in tests.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, BufReader, BufWriter};
use tokio::net::TcpStream;
use tracing::debug;

use crate::protocol::{self, Command, ReadOutcome, QUEUE_EMPTY};
use crate::queue::Message;
use crate::registry::QueueRegistry;
use crate::shutdown::Shutdown;

/// Per-connection handler. Created on accept, destroyed when the peer
/// closes or the process is shutting down.
pub struct Connection {
    stream: TcpStream,
    registry: Arc<QueueRegistry>,
    shutdown: Shutdown,
    peer: std::net::SocketAddr,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        registry: Arc<QueueRegistry>,
        shutdown: Shutdown,
        peer: std::net::SocketAddr,
    ) -> Self {
        Self {
            stream,
            registry,
            shutdown,
            peer,
        }
    }

    /// Run the connection to completion. Never returns an error to the
    /// caller: all failures are either reported to the client as `ERR` (and
    /// the loop continues) or cause a silent close, matching §7's transport
    /// error handling.
    pub async fn run(self) {
        if let Err(e) = self.stream.set_nodelay(true) {
            debug!(peer = %self.peer, error = %e, "failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = self.stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);

        run_loop(
            &mut reader,
            &mut writer,
            &self.registry,
            &self.shutdown,
            self.peer,
        )
        .await;
    }
}

/// Drive the per-connection state machine described in the module docs
/// against any buffered reader/writer pair, until the peer disconnects, a
/// transport error occurs, or shutdown is observed.
pub async fn run_loop<R, W>(
    reader: &mut R,
    writer: &mut W,
    registry: &QueueRegistry,
    shutdown: &Shutdown,
    peer: std::net::SocketAddr,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        if shutdown.is_shutting_down() {
            debug!(%peer, "shutdown observed, closing connection");
            break;
        }

        let outcome = match protocol::read_command(reader).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(%peer, error = %e, "transport error reading command");
                break;
            }
        };

        let command = match outcome {
            ReadOutcome::Eof => {
                debug!(%peer, "peer closed connection");
                break;
            }
            ReadOutcome::Invalid(e) => {
                if protocol::write_err(writer, e).await.is_err() {
                    break;
                }
                continue;
            }
            ReadOutcome::Command(command) => command,
        };

        let keep_going = match command {
            Command::Enqueue { name } => handle_enqueue(reader, writer, registry, peer, name).await,
            Command::Dequeue { name } => handle_dequeue(writer, registry, name).await,
            Command::List { name, limit } => handle_list(writer, registry, name, limit).await,
        };

        if !keep_going {
            break;
        }
    }
}

/// `ENQUEUE <name>\n<len>\n<len bytes>`. Returns `false` if the connection
/// must be closed (unrecoverable transport error, including a short read
/// after payload bytes have begun being consumed — a desync the codec
/// cannot recover from).
async fn handle_enqueue<R, W>(
    reader: &mut R,
    writer: &mut W,
    registry: &QueueRegistry,
    peer: std::net::SocketAddr,
    name: Vec<u8>,
) -> bool
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let len = match protocol::read_enqueue_length(reader).await {
        Ok(Ok(Some(len))) => len,
        Ok(Ok(None)) => {
            debug!(%peer, "peer closed before sending message length");
            return false;
        }
        Ok(Err(e)) => return protocol::write_err(writer, e).await.is_ok(),
        Err(e) => {
            debug!(%peer, error = %e, "transport error reading message length");
            return false;
        }
    };

    let mut payload = vec![0u8; len];
    if let Err(e) = reader.read_exact(&mut payload).await {
        debug!(%peer, error = %e, "short read on ENQUEUE payload, closing");
        return false;
    }

    let queue = registry
        .locate(&name, true)
        .expect("create_if_missing=true always returns Some");
    queue.append(Message::new(payload));

    protocol::write_ok(writer).await.is_ok()
}

/// `DEQUEUE <name>\n`.
async fn handle_dequeue<W>(writer: &mut W, registry: &QueueRegistry, name: Vec<u8>) -> bool
where
    W: AsyncWrite + Unpin,
{
    let popped = registry.locate(&name, false).and_then(|queue| queue.pop());

    match popped {
        Some(message) => protocol::write_ok_payload(writer, &message).await.is_ok(),
        None => protocol::write_err(writer, QUEUE_EMPTY).await.is_ok(),
    }
}

/// `LIST <name> [<limit>]\n`.
async fn handle_list<W>(
    writer: &mut W,
    registry: &QueueRegistry,
    name: Vec<u8>,
    limit: usize,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let messages = match registry.locate(&name, false) {
        None => Vec::new(),
        Some(queue) => match queue.snapshot(limit) {
            Ok(messages) => messages,
            Err(e) => return protocol::write_err(writer, e).await.is_ok(),
        },
    };

    protocol::write_ok_list(writer, &messages).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_then_dequeue_round_trip_via_registry() {
        let registry = QueueRegistry::new();
        let queue = registry.locate(b"jobs", true).unwrap();
        queue.append(Message::new(b"hello".to_vec()));

        let popped = registry.locate(b"jobs", false).and_then(|q| q.pop());
        assert_eq!(popped.as_ref().unwrap().as_bytes(), b"hello");

        let mut out = Vec::new();
        protocol::write_ok_payload(&mut out, popped.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(out, b"OK 5\nhello");
    }

    #[tokio::test]
    async fn dequeue_unknown_queue_reports_queue_empty() {
        let registry = QueueRegistry::new();
        assert!(registry.locate(b"missing", false).is_none());

        let mut out = Vec::new();
        protocol::write_err(&mut out, QUEUE_EMPTY).await.unwrap();
        assert_eq!(out, b"ERR Queue empty\n");
    }

    #[tokio::test]
    async fn list_prefix_does_not_consume_messages() {
        let registry = QueueRegistry::new();
        let queue = registry.locate(b"q", true).unwrap();
        queue.append(Message::new(b"A".to_vec()));
        queue.append(Message::new(b"B".to_vec()));
        queue.append(Message::new(b"C".to_vec()));

        let snap = queue.snapshot(2).unwrap();
        assert_eq!(snap.len(), 2);

        // LIST must not have removed anything.
        assert_eq!(queue.pop().unwrap().as_bytes(), b"A");
    }

    /// Drives `run_loop` over an in-memory duplex pipe (no socket bound),
    /// covering scenarios S1/S2/S6 from the wire protocol end to end.
    #[tokio::test]
    async fn duplex_enqueue_dequeue_unknown_and_unknown_command() {
        use tokio::io::{duplex, split, AsyncReadExt as _, AsyncWriteExt as _};

        let (mut client, server) = duplex(4096);
        let registry = QueueRegistry::new();
        let shutdown = Shutdown::new();
        let peer: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();

        let handle = tokio::spawn(async move {
            let (read_half, write_half) = split(server);
            let mut reader = BufReader::new(read_half);
            let mut writer = write_half;
            run_loop(&mut reader, &mut writer, &registry, &shutdown, peer).await;
        });

        client.write_all(b"ENQUEUE jobs\n5\nhello").await.unwrap();
        let mut buf = [0u8; 3];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"OK\n");

        client.write_all(b"DEQUEUE jobs\n").await.unwrap();
        let mut buf = [0u8; 10];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"OK 5\nhello");

        client.write_all(b"NUKE jobs\n").await.unwrap();
        let mut buf = vec![0u8; "ERR Unknown command\n".len()];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, b"ERR Unknown command\n");

        drop(client);
        handle.await.unwrap();
    }
}
