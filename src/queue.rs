//! # Queue Module
//!
//! This module provides the in-memory FIFO queue representation used by the
//! broker: an owned [`Message`] payload and a [`QueueBody`] that holds a
//! strictly ordered sequence of them behind its own guard.
//!
//! ## Key Design Principles
//!
//! - **Strict FIFO**: appends happen only at the tail, removals only at the head.
//! - **Independent guards**: each `QueueBody` owns its own mutex so that
//!   throughput on one queue never serializes against another.
//! - **Synchronous critical sections**: the guard is a plain [`std::sync::Mutex`]
//!   and is never held across an `.await` point.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::protocol::BrokerError;

/// The maximum payload size accepted by `ENQUEUE`: 100 MiB.
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// An immutable, owned byte payload.
///
/// The length of a `Message` is always `payload.len()` — there is no
/// separate counter that could desynchronize from the buffer it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    payload: Vec<u8>,
}

impl Message {
    /// Wrap a byte buffer as a `Message`. Callers are expected to have
    /// already validated the length against [`MAX_MESSAGE_LEN`].
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Length of the payload in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the message and take ownership of its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.payload
    }
}

/// A single named FIFO queue: an ordered sequence of [`Message`]s plus its
/// own mutual-exclusion guard and a cached length.
///
/// Every operation here is atomic: the guard is acquired, the operation is
/// performed against the in-memory `VecDeque`, and the guard is released —
/// never across network I/O.
#[derive(Debug, Default)]
pub struct QueueBody {
    messages: Mutex<VecDeque<Message>>,
}

impl QueueBody {
    pub fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a message at the tail. Constant-time; increments the count.
    pub fn append(&self, message: Message) {
        let mut guard = self.messages.lock().expect("queue mutex poisoned");
        guard.push_back(message);
    }

    /// Remove and return the message at the head, or `None` if the queue is empty.
    pub fn pop(&self) -> Option<Message> {
        let mut guard = self.messages.lock().expect("queue mutex poisoned");
        guard.pop_front()
    }

    /// Current number of messages in the queue.
    pub fn len(&self) -> usize {
        let guard = self.messages.lock().expect("queue mutex poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-only traversal from the head, returning independent copies.
    ///
    /// `limit == 0` (or any non-positive limit normalized to 0 by the caller)
    /// means "all messages"; otherwise at most `min(limit, count)` messages
    /// are returned. The queue itself is never modified by a snapshot, and
    /// every copy is allocated before the call returns — there is no partial
    /// result on allocation failure; the whole snapshot either succeeds or
    /// the caller sees a resource error and the queue is left untouched.
    pub fn snapshot(&self, limit: usize) -> Result<Vec<Message>, BrokerError> {
        let guard = self.messages.lock().expect("queue mutex poisoned");
        let take = if limit > 0 {
            limit.min(guard.len())
        } else {
            guard.len()
        };

        let mut out = Vec::with_capacity(take);
        for message in guard.iter().take(take) {
            out.push(message.clone());
        }
        Ok(out)
    }
}
