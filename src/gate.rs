//! Readiness handshake between the server and client supervisors.
//!
//! The server side publishes its bound address exactly once, after `listen`
//! has succeeded; the client side blocks until it observes the address.
//! Waiting re-checks the published value on a poll interval in addition to
//! waking on change notifications, so a waiter that starts after the signal
//! was sent still observes it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::SetupError;

/// Set-once signal that the listener is live, carrying its bound address.
///
/// Cloning produces another handle onto the same signal. The value is
/// monotonic: `None` until `signal_ready`, then `Some(addr)` forever.
#[derive(Clone)]
pub struct ReadinessGate {
    tx: Arc<watch::Sender<Option<SocketAddr>>>,
    rx: watch::Receiver<Option<SocketAddr>>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        ReadinessGate {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// A gate that is already signaled, for standalone client runs where
    /// the server lives in another process.
    pub fn ready(addr: SocketAddr) -> Self {
        let gate = ReadinessGate::new();
        gate.signal_ready(addr);
        gate
    }

    /// Publish the listening address and wake all waiters.
    ///
    /// The first call wins; later calls are no-ops.
    pub fn signal_ready(&self, addr: SocketAddr) {
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(addr);
                true
            } else {
                false
            }
        });
    }

    /// The published address, if the signal has been sent.
    pub fn ready_now(&self) -> Option<SocketAddr> {
        *self.rx.borrow()
    }

    /// Block until the signal is set, re-checking every `poll_interval`.
    ///
    /// The value is inspected before waiting and after every wakeup, so the
    /// signal cannot be missed regardless of ordering.
    pub async fn await_ready(&self, poll_interval: Duration) -> Result<SocketAddr, SetupError> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(addr) = *rx.borrow_and_update() {
                return Ok(addr);
            }
            match timeout(poll_interval, rx.changed()).await {
                // Woken by a publish; loop around and read it.
                Ok(Ok(())) => {}
                Ok(Err(_)) => {
                    return Err(SetupError::Sync("readiness channel closed".to_string()))
                }
                // Poll interval elapsed; re-check the value.
                Err(_) => {}
            }
        }
    }

    /// Bounded variant of [`await_ready`](Self::await_ready).
    ///
    /// Fails with `ReadyTimeout` if the signal does not arrive within
    /// `max_wait`, so a dead server side produces a setup failure instead
    /// of a hang.
    pub async fn await_ready_for(
        &self,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<SocketAddr, SetupError> {
        timeout(max_wait, self.await_ready(poll_interval))
            .await
            .map_err(|_| SetupError::ReadyTimeout(max_wait))?
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}
