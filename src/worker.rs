//! Per-connection workers.
//!
//! Each worker owns one socket end-to-end and runs the exchange for its
//! role: server workers receive the payload and echo the same bytes back,
//! client workers send the payload and (by default) verify the echo. The
//! socket closes exactly once, on every exit path, when the worker drops it.

use std::net::SocketAddr;

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{SetupError, TransferError};
use crate::transfer::{pattern_payload, recv_exact, send_chunked};

/// Which side of the exchange a worker drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// Worker lifecycle, advanced strictly forward.
///
/// Servers move `Created → Receiving → Sending → Done`; clients move
/// `Created → Sending → Receiving → Done` (the receive leg is skipped when
/// echo verification is off). Any error short-circuits to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Receiving,
    Sending,
    Done,
    Failed,
}

/// What one worker reports back to its supervisor.
#[derive(Debug)]
pub struct WorkerOutcome {
    pub index: usize,
    pub role: Role,
    pub peer: SocketAddr,
    pub state: WorkerState,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub error: Option<TransferError>,
}

impl WorkerOutcome {
    pub fn passed(&self) -> bool {
        matches!(self.state, WorkerState::Done)
    }
}

/// One connection's worker. Generic over the stream so unit tests can run
/// it on an in-memory duplex pipe.
pub struct Worker<S> {
    stream: S,
    index: usize,
    role: Role,
    peer: SocketAddr,
    payload_size: usize,
    verify_echo: bool,
    state: WorkerState,
    bytes_sent: usize,
    bytes_received: usize,
}

impl<S> Worker<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        index: usize,
        role: Role,
        peer: SocketAddr,
        payload_size: usize,
        verify_echo: bool,
    ) -> Self {
        Worker {
            stream,
            index,
            role,
            peer,
            payload_size,
            verify_echo,
            state: WorkerState::Created,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    /// Run the exchange to completion and report the outcome.
    ///
    /// Never retries; the first failure aborts the remaining phases. The
    /// socket is dropped, and thereby closed, exactly once on return.
    pub async fn run(mut self) -> WorkerOutcome {
        let error = match self.exchange().await {
            Ok(()) => {
                self.state = WorkerState::Done;
                debug!(
                    index = self.index,
                    role = ?self.role,
                    peer = %self.peer,
                    bytes_sent = self.bytes_sent,
                    bytes_received = self.bytes_received,
                    "worker finished"
                );
                None
            }
            Err(e) => {
                self.state = WorkerState::Failed;
                warn!(
                    index = self.index,
                    role = ?self.role,
                    peer = %self.peer,
                    error = %e,
                    "worker failed"
                );
                Some(e)
            }
        };

        WorkerOutcome {
            index: self.index,
            role: self.role,
            peer: self.peer,
            state: self.state,
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            error,
        }
    }

    async fn exchange(&mut self) -> Result<(), TransferError> {
        let mut rng = StdRng::from_entropy();

        match self.role {
            Role::Server => {
                self.state = WorkerState::Receiving;
                let mut buf = BytesMut::zeroed(self.payload_size);
                recv_exact(&mut self.stream, &mut buf).await?;
                self.bytes_received = self.payload_size;

                // Echo back the bytes actually received, not a fresh buffer.
                self.state = WorkerState::Sending;
                let echo = buf.freeze();
                send_chunked(&mut self.stream, &echo, &mut rng).await?;
                self.bytes_sent = self.payload_size;
            }
            Role::Client => {
                self.state = WorkerState::Sending;
                let payload = pattern_payload(self.payload_size);
                send_chunked(&mut self.stream, &payload, &mut rng).await?;
                self.bytes_sent = self.payload_size;

                if self.verify_echo {
                    self.state = WorkerState::Receiving;
                    let mut echo = BytesMut::zeroed(self.payload_size);
                    recv_exact(&mut self.stream, &mut echo).await?;
                    self.bytes_received = self.payload_size;

                    if let Some(offset) = first_mismatch(&payload, &echo) {
                        return Err(TransferError::EchoMismatch { offset });
                    }
                }
            }
        }
        Ok(())
    }
}

fn first_mismatch(sent: &[u8], echoed: &[u8]) -> Option<usize> {
    sent.iter().zip(echoed).position(|(a, b)| a != b)
}

/// Bounded collection of in-flight workers for one role.
///
/// Populated as workers spawn, drained at join; never grows past the
/// configured connection count. Dropping the registry aborts any workers
/// still running, which closes their sockets and unblocks their peers.
pub struct Registry {
    workers: JoinSet<WorkerOutcome>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Registry {
            workers: JoinSet::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.workers.len() >= self.capacity
    }

    /// Spawn a worker task and track its handle.
    pub fn spawn<S>(&mut self, worker: Worker<S>)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        debug_assert!(!self.is_full());
        self.workers.spawn(worker.run());
    }

    /// Wait for every tracked worker and collect outcomes in worker order.
    ///
    /// A panicked worker task counts as a broken substrate, not a failed
    /// transfer.
    pub async fn join_all(mut self) -> Result<Vec<WorkerOutcome>, SetupError> {
        let mut outcomes = Vec::with_capacity(self.workers.len());
        while let Some(joined) = self.workers.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => return Err(SetupError::Sync(format!("worker task failed: {e}"))),
            }
        }
        outcomes.sort_by_key(|o| o.index);
        Ok(outcomes)
    }
}
