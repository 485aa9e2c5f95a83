//! # Queue Registry Module
//!
//! This module provides the process-wide directory mapping queue names to
//! [`QueueBody`] instances. It is the single source of truth for "does a
//! queue with this name exist", and the only place a new queue is born.
//!
//! ## Concurrency
//!
//! The registry guard covers the full lookup-and-possibly-insert critical
//! section. Once a reference is handed out it is an `Arc<QueueBody>` that
//! remains valid for the process lifetime, so callers release the registry
//! guard before touching per-queue state — lock order is always
//! *registry guard → queue guard*, never the reverse, which rules out
//! deadlock between the two guard types by construction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::queue::QueueBody;

/// A queue name: a non-empty byte string of at most 255 bytes (enforced by
/// the protocol layer before it reaches the registry). Compared bytewise,
/// with no normalization.
pub type QueueName = Vec<u8>;

/// The process-wide directory of queues by name.
///
/// A queue, once inserted, is never removed or replaced for the process
/// lifetime — there is no delete operation. This sidesteps use-after-free
/// and reference-counting hazards entirely: handed-out `Arc<QueueBody>`s
/// never need to be invalidated.
#[derive(Default)]
pub struct QueueRegistry {
    queues: Mutex<HashMap<QueueName, Arc<QueueBody>>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a queue by name, optionally creating it.
    ///
    /// With `create_if_missing = true`, returns a reference to an existing
    /// queue or atomically creates, inserts, and returns a new, empty one.
    ///
    /// With `create_if_missing = false`, returns `None` without mutating
    /// the registry if no queue with that name has ever been enqueued to.
    pub fn locate(&self, name: &[u8], create_if_missing: bool) -> Option<Arc<QueueBody>> {
        let mut guard = self.queues.lock().expect("registry mutex poisoned");

        if let Some(queue) = guard.get(name) {
            return Some(queue.clone());
        }

        if !create_if_missing {
            return None;
        }

        let queue = Arc::new(QueueBody::new());
        guard.insert(name.to_vec(), queue.clone());
        Some(queue)
    }

    /// Number of distinct queue names known to the registry. Exposed for
    /// tests only; the wire protocol has no way to enumerate queues.
    #[cfg(test)]
    fn queue_count(&self) -> usize {
        self.queues.lock().expect("registry mutex poisoned").len()
    }
}
