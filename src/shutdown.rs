//! # Shutdown Module
//!
//! A small cooperative shutdown signal shared between the accept loop and
//! every in-flight connection task. Setting it does not forcibly abort any
//! task; each task observes it at its own natural checkpoints (between
//! commands, and racing it against `accept()`) and exits cleanly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Notified, Notify};

/// Cheaply cloneable shutdown handle. All clones observe the same
/// underlying flag and notifier.
#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown and wake anyone waiting on [`Shutdown::notified`].
    /// Idempotent: calling it more than once has no additional effect.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Returns the `Notified` future to race against `accept()` in the
    /// server loop. `notify_waiters` wakes only waiters registered at the
    /// time it's called and stores no permit, so a naive
    /// `shutdown.notified().await` built fresh inside `select!` can miss a
    /// `trigger()` that lands between a flag check and the `select!`
    /// registering its waiter. Callers must `tokio::pin!` the returned
    /// future and call `.enable()` on it *before* checking
    /// [`Shutdown::is_shutting_down`], so the waiter is registered first and
    /// no notification can slip through the gap.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_shutting_down() {
        let s = Shutdown::new();
        assert!(!s.is_shutting_down());
    }

    #[test]
    fn trigger_is_observable_and_idempotent() {
        let s = Shutdown::new();
        s.trigger();
        assert!(s.is_shutting_down());
        s.trigger();
        assert!(s.is_shutting_down());
    }

    #[tokio::test]
    async fn notified_resolves_after_trigger() {
        let s = Shutdown::new();
        let waiter = s.clone();
        let handle = tokio::spawn(async move {
            waiter.notified().await;
        });

        // Give the waiter a chance to register before triggering.
        tokio::task::yield_now().await;
        s.trigger();

        handle.await.unwrap();
    }

    #[test]
    fn clones_share_state() {
        let a = Shutdown::new();
        let b = a.clone();
        a.trigger();
        assert!(b.is_shutting_down());
    }
}
