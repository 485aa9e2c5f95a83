//! # Protocol Codec Module
//!
//! The wire is line-oriented for commands, length-prefixed binary for
//! payloads. This module owns both directions: parsing request frames off
//! an input byte stream, and writing response frames to an output byte
//! stream. It also defines the typed error hierarchy the rest of the crate
//! uses to distinguish protocol, resource, and transport failures.
//!
//! Lines are terminated by a single `\n`; a preceding `\r` is tolerated and
//! stripped. All textual headers are ASCII.

use std::fmt;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::queue::{Message, MAX_MESSAGE_LEN};

/// Size of the scratch buffer used to discard an overlong line without
/// buffering an attacker-controlled amount of data.
const DISCARD_CHUNK_LEN: usize = 512;

/// Command lines longer than this (including the terminating `\n`) are
/// rejected as `ERR Invalid command`; the excess is discarded up to the
/// next `\n` before the next command is parsed.
pub const MAX_COMMAND_LINE: usize = 1024;

/// Queue names longer than this are rejected as a missing/invalid name.
pub const MAX_QUEUE_NAME_LEN: usize = 255;

/// Parse-time protocol failures, carrying the exact wire reason text used
/// in the `ERR <reason>` response line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Missing queue name")]
    MissingQueueName,
    #[error("Invalid message length")]
    InvalidLength,
    /// Covers both an overlong command line and a blank/whitespace-only one
    /// (no tokens at all) — the original `sscanf`-based parser reports the
    /// same "Invalid command" text for either.
    #[error("Invalid command")]
    InvalidCommand,
}

/// The broader error type used across the core: a protocol parse failure,
/// a resource (allocation-style) failure, or a transport I/O failure.
///
/// `Io` is never rendered to a client — it always means the connection is
/// being torn down, per the unrecoverable transport-error handling in the
/// connection state machine.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("{0}")]
    Resource(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    /// The reason text to send back as `ERR <reason>`, if this error is one
    /// that gets reported to the client at all (transport errors are not).
    pub fn wire_reason(&self) -> Option<String> {
        match self {
            BrokerError::Protocol(e) => Some(e.to_string()),
            BrokerError::Resource(reason) => Some(reason.clone()),
            BrokerError::Io(_) => None,
        }
    }
}

/// A fully parsed request, ready for dispatch against the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Enqueue { name: Vec<u8> },
    Dequeue { name: Vec<u8> },
    List { name: Vec<u8>, limit: usize },
}

/// The result of trying to read one command frame off the wire.
pub enum ReadOutcome {
    /// A well-formed command line.
    Command(Command),
    /// A recoverable parse failure; the connection stays open and the
    /// caller should write `ERR <reason>` and continue reading.
    Invalid(ProtocolError),
    /// The peer closed the connection (or shutdown was observed) before a
    /// new command line began. The caller should close without responding.
    Eof,
}

/// Read one line from `reader`, bounded by [`MAX_COMMAND_LINE`].
///
/// The read itself is capped with a `Take` adapter, so a peer that streams
/// bytes with no `\n` cannot force unbounded buffering — the cap is applied
/// as the bytes come in, not after the fact. If the cap is hit before a
/// `\n` is found, the rest of the line is discarded in fixed-size chunks
/// (see [`discard_until_newline`]) rather than buffered in full, so the
/// stream is resynchronized at the next line boundary.
async fn read_bounded_line<R>(reader: &mut R) -> std::io::Result<BoundedLine>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = {
        let mut bounded = (&mut *reader).take(MAX_COMMAND_LINE as u64 + 1);
        bounded.read_until(b'\n', &mut buf).await?
    };
    if n == 0 {
        return Ok(BoundedLine::Eof);
    }

    if buf.len() > MAX_COMMAND_LINE || buf.last() != Some(&b'\n') {
        // Either the cap was hit before a `\n` arrived, or the peer
        // disconnected mid-line. Either way, discard the remainder of the
        // current line so the next read starts at a real command boundary.
        if buf.last() != Some(&b'\n') {
            discard_until_newline(reader).await?;
        }
        return Ok(BoundedLine::TooLong);
    }

    // Strip the trailing `\n` and an optional preceding `\r`.
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(BoundedLine::Line(buf))
}

/// Discard bytes up to and including the next `\n` (or EOF), reading in
/// fixed-size chunks so an unbounded run of garbage from a peer never
/// accumulates in memory.
async fn discard_until_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; DISCARD_CHUNK_LEN];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 || chunk[..n].contains(&b'\n') {
            return Ok(());
        }
    }
}

enum BoundedLine {
    Line(Vec<u8>),
    TooLong,
    Eof,
}

/// Split a line into whitespace-delimited tokens (ASCII space/tab), the
/// same tokenization the original `sscanf("%s ...")` grammar performs.
fn tokenize(line: &[u8]) -> Vec<&[u8]> {
    line.split(|b| *b == b' ' || *b == b'\t')
        .filter(|tok| !tok.is_empty())
        .collect()
}

/// Parse an already-extracted command line into a [`Command`].
///
/// The first token selects the command by prefix match against `ENQUEUE`,
/// `DEQUEUE`, and `LIST` (case-sensitive); anything else is unknown.
fn parse_line(line: &[u8]) -> Result<Command, ProtocolError> {
    let tokens = tokenize(line);
    let first = *tokens.first().ok_or(ProtocolError::InvalidCommand)?;

    if first.starts_with(b"ENQUEUE") {
        let name = parse_queue_name(tokens.get(1).copied())?;
        Ok(Command::Enqueue { name })
    } else if first.starts_with(b"DEQUEUE") {
        let name = parse_queue_name(tokens.get(1).copied())?;
        Ok(Command::Dequeue { name })
    } else if first.starts_with(b"LIST") {
        let name = parse_queue_name(tokens.get(1).copied())?;
        let limit = match tokens.get(2) {
            Some(raw) => parse_ascii_usize(raw).unwrap_or(0),
            None => 0,
        };
        Ok(Command::List { name, limit })
    } else {
        Err(ProtocolError::UnknownCommand)
    }
}

fn parse_queue_name(token: Option<&[u8]>) -> Result<Vec<u8>, ProtocolError> {
    let token = token.ok_or(ProtocolError::MissingQueueName)?;
    if token.is_empty() || token.len() > MAX_QUEUE_NAME_LEN {
        return Err(ProtocolError::MissingQueueName);
    }
    Ok(token.to_vec())
}

fn parse_ascii_usize(raw: &[u8]) -> Option<usize> {
    if raw.is_empty() || !raw.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// Read and parse one command frame (the command line only — `ENQUEUE`'s
/// length line and payload are read separately by the connection handler
/// once it knows a queue name has been accepted).
pub async fn read_command<R>(reader: &mut R) -> std::io::Result<ReadOutcome>
where
    R: AsyncBufRead + Unpin,
{
    match read_bounded_line(reader).await? {
        BoundedLine::Eof => Ok(ReadOutcome::Eof),
        BoundedLine::TooLong => Ok(ReadOutcome::Invalid(ProtocolError::InvalidCommand)),
        BoundedLine::Line(line) => match parse_line(&line) {
            Ok(command) => Ok(ReadOutcome::Command(command)),
            Err(e) => Ok(ReadOutcome::Invalid(e)),
        },
    }
}

/// Read the `<len>\n` line that follows `ENQUEUE <name>\n` and validate it.
///
/// Returns `Err(ProtocolError::InvalidLength)` for zero, oversize, or
/// unparsable lengths, and `Ok(None)` if the peer disconnected before
/// sending the length line (the caller should close the connection, since
/// no payload bytes were read yet this is still at a line boundary).
pub async fn read_enqueue_length<R>(
    reader: &mut R,
) -> std::io::Result<Result<Option<usize>, ProtocolError>>
where
    R: AsyncBufRead + Unpin,
{
    match read_bounded_line(reader).await? {
        BoundedLine::Eof => Ok(Ok(None)),
        BoundedLine::TooLong => Ok(Err(ProtocolError::InvalidLength)),
        BoundedLine::Line(line) => match parse_ascii_usize(&line) {
            Some(len) if len > 0 && len <= MAX_MESSAGE_LEN => Ok(Ok(Some(len))),
            _ => Ok(Err(ProtocolError::InvalidLength)),
        },
    }
}

/// Write `OK\n` (the `ENQUEUE` success response).
pub async fn write_ok<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"OK\n").await?;
    writer.flush().await
}

/// Write `OK <len>\n` followed by the raw payload bytes (the `DEQUEUE`
/// success response). No trailing newline follows the payload.
pub async fn write_ok_payload<W>(writer: &mut W, message: &Message) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("OK {}\n", message.len()).as_bytes())
        .await?;
    writer.write_all(message.as_bytes()).await?;
    writer.flush().await
}

/// Write the `LIST` success response: `OK <n>\n` followed by, for each
/// message in FIFO order, `<len_i>\n` then the raw bytes.
pub async fn write_ok_list<W>(writer: &mut W, messages: &[Message]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("OK {}\n", messages.len()).as_bytes())
        .await?;
    for message in messages {
        writer
            .write_all(format!("{}\n", message.len()).as_bytes())
            .await?;
        writer.write_all(message.as_bytes()).await?;
    }
    writer.flush().await
}

/// Write `ERR <reason>\n`.
pub async fn write_err<W>(writer: &mut W, reason: impl fmt::Display) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(format!("ERR {}\n", reason).as_bytes())
        .await?;
    writer.flush().await
}

/// The fixed reason text for `DEQUEUE` against an empty or unknown queue.
/// The two cases are not distinguished on the wire, preserving the source
/// implementation's conflation.
pub const QUEUE_EMPTY: &str = "Queue empty";
