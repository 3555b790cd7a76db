//! Server-side supervisor.
//!
//! Binds a listener with address reuse, signals readiness with the bound
//! address, then accepts exactly the configured number of connections,
//! spawning one echo worker per accepted socket.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{HarnessError, SetupError};
use crate::gate::ReadinessGate;
use crate::worker::{Registry, Role, Worker, WorkerOutcome};

/// A failed accept does not consume a connection slot; it is retried up to
/// this cap so a persistently broken listener cannot spin forever.
const ACCEPT_RETRY_LIMIT: u32 = 64;

/// Handle to a running server supervisor.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    task: JoinHandle<Result<Vec<WorkerOutcome>, SetupError>>,
}

impl ServerHandle {
    /// The address the listener actually bound, relevant for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// Wait for all accepted workers to finish and collect their outcomes.
    pub async fn join(self) -> Result<Vec<WorkerOutcome>, HarnessError> {
        self.task
            .await
            .map_err(|e| HarnessError::Join(format!("server supervisor: {e}")))?
            .map_err(HarnessError::Setup)
    }
}

/// Bind, listen, signal readiness, then start accepting in the background.
///
/// Readiness is signaled strictly after `listen` succeeds and strictly
/// before the accept loop runs, so a connect observed by the client side
/// always lands on a live listener. Bind and listen failures are returned
/// directly; the run cannot proceed without the listener.
pub fn start(config: &Config, gate: ReadinessGate) -> Result<ServerHandle, SetupError> {
    let listener = bind_listener(config.addr, config.backlog as i32)?;
    let local_addr = listener.local_addr().map_err(SetupError::SocketCreate)?;

    gate.signal_ready(local_addr);
    info!(
        addr = %local_addr,
        connections = config.connections,
        "server listening"
    );

    let task = tokio::spawn(accept_loop(listener, config.clone()));
    Ok(ServerHandle { local_addr, task })
}

/// Accept exactly `config.connections` sockets, one worker each, then join
/// them all.
async fn accept_loop(
    listener: TcpListener,
    config: Config,
) -> Result<Vec<WorkerOutcome>, SetupError> {
    let mut registry = Registry::new(config.connections);
    let mut failed_accepts = 0u32;

    while !registry.is_full() {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let index = registry.len();
                debug!(index, peer = %peer, "accepted connection");
                registry.spawn(Worker::new(
                    stream,
                    index,
                    Role::Server,
                    peer,
                    config.payload_size,
                    false,
                ));
            }
            Err(e) => {
                failed_accepts += 1;
                if failed_accepts > ACCEPT_RETRY_LIMIT {
                    error!(error = %e, attempts = failed_accepts, "giving up on accept");
                    return Err(SetupError::Accept {
                        attempts: failed_accepts,
                        source: e,
                    });
                }
                warn!(error = %e, attempt = failed_accepts, "accept failed, retrying");
            }
        }
    }

    registry.join_all().await
}

/// Create the listening socket with `SO_REUSEADDR` set before bind, so
/// rapid successive runs do not trip over sockets in TIME_WAIT.
fn bind_listener(addr: SocketAddr, backlog: i32) -> Result<TcpListener, SetupError> {
    let socket = Socket::new(
        match addr {
            SocketAddr::V4(_) => Domain::IPV4,
            SocketAddr::V6(_) => Domain::IPV6,
        },
        Type::STREAM,
        Some(Protocol::TCP),
    )
    .map_err(SetupError::SocketCreate)?;

    socket
        .set_reuse_address(true)
        .map_err(SetupError::SocketCreate)?;
    socket
        .bind(&addr.into())
        .map_err(|e| SetupError::Bind { addr, source: e })?;
    socket
        .listen(backlog)
        .map_err(|e| SetupError::Listen { addr, source: e })?;
    socket
        .set_nonblocking(true)
        .map_err(SetupError::SocketCreate)?;

    TcpListener::from_std(socket.into()).map_err(SetupError::SocketCreate)
}
