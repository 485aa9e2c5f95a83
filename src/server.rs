//! # Server Module
//!
//! The accept loop: binds a listening socket, then spawns one [`Connection`]
//! task per accepted client until asked to shut down.
//!
//! ## Concurrency
//!
//! `accept()` is raced against the shutdown notifier with `tokio::select!`
//! so a `Ctrl-C` during a quiet period doesn't have to wait for a new
//! connection to arrive before the process can exit.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::registry::QueueRegistry;
use crate::shutdown::Shutdown;

/// Bind a `TcpListener` at `addr` with `SO_REUSEADDR` set, so the broker can
/// be restarted immediately after a crash without waiting out `TIME_WAIT`.
pub fn bind(addr: SocketAddr) -> Result<TcpListener> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::STREAM, None)
        .with_context(|| format!("failed to create socket for {addr}"))?;
    socket
        .set_reuse_address(true)
        .with_context(|| "failed to set SO_REUSEADDR".to_string())?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("failed to bind {addr}"))?;
    socket
        .listen(1024)
        .with_context(|| "failed to listen on socket".to_string())?;
    socket
        .set_nonblocking(true)
        .with_context(|| "failed to set socket non-blocking".to_string())?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
        .with_context(|| format!("failed to hand socket to the async runtime for {addr}"))
}

/// Run the accept loop to completion. Returns once shutdown has been
/// triggered and the listener has stopped accepting new connections.
/// Already-spawned connection tasks are not awaited here; they drain on
/// their own as each peer finishes or observes shutdown.
pub async fn serve(listener: TcpListener, registry: Arc<QueueRegistry>, shutdown: Shutdown) {
    let local_addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!(addr = %local_addr, "accept loop started");

    // Register as a waiter before the first shutdown check so a `trigger()`
    // racing this setup can never be missed (`Notify::notify_waiters` wakes
    // only already-registered waiters and stores no permit for latecomers).
    let notified = shutdown.notified();
    tokio::pin!(notified);
    notified.as_mut().enable();

    loop {
        if shutdown.is_shutting_down() {
            break;
        }

        tokio::select! {
            biased;

            _ = &mut notified => {
                debug!("shutdown notified, leaving accept loop");
                break;
            }

            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let registry = registry.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            Connection::new(stream, registry, shutdown, peer).run().await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }

    info!("accept loop stopped");
}
