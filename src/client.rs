//! Client-side supervisor.
//!
//! Waits on the readiness gate, then opens the configured number of
//! connections and spawns one sending worker per connection. Any connect
//! failure is fatal: the test is meaningless with fewer connections than
//! configured.

use std::net::SocketAddr;

use tokio::net::{TcpSocket, TcpStream};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{HarnessError, SetupError};
use crate::gate::ReadinessGate;
use crate::worker::{Registry, Role, Worker, WorkerOutcome};

/// Handle to a running client supervisor.
pub struct ClientHandle {
    task: JoinHandle<Result<Vec<WorkerOutcome>, SetupError>>,
}

impl ClientHandle {
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }

    /// Wait for all client workers to finish and collect their outcomes.
    pub async fn join(self) -> Result<Vec<WorkerOutcome>, HarnessError> {
        self.task
            .await
            .map_err(|e| HarnessError::Join(format!("client supervisor: {e}")))?
            .map_err(HarnessError::Setup)
    }
}

/// Spawn the connect loop. All failures, including a server that never
/// becomes ready, surface through [`ClientHandle::join`].
pub fn start(config: &Config, gate: ReadinessGate) -> ClientHandle {
    let task = tokio::spawn(connect_loop(config.clone(), gate));
    ClientHandle { task }
}

async fn connect_loop(
    config: Config,
    gate: ReadinessGate,
) -> Result<Vec<WorkerOutcome>, SetupError> {
    let result = connect_and_run(config, gate).await;
    // A stalled server side can mask this error until the run deadline.
    if let Err(e) = &result {
        error!(error = %e, "client supervisor failed");
    }
    result
}

async fn connect_and_run(
    config: Config,
    gate: ReadinessGate,
) -> Result<Vec<WorkerOutcome>, SetupError> {
    let addr = gate
        .await_ready_for(config.ready_poll, config.ready_timeout)
        .await?;
    info!(
        addr = %addr,
        connections = config.connections,
        "server ready, connecting"
    );

    let mut registry = Registry::new(config.connections);
    while !registry.is_full() {
        let index = registry.len();
        let stream = connect_stream(addr).await?;
        debug!(index, addr = %addr, "connected");
        registry.spawn(Worker::new(
            stream,
            index,
            Role::Client,
            addr,
            config.payload_size,
            config.verify_echo,
        ));
    }

    registry.join_all().await
}

/// Open one connection with `SO_REUSEADDR` set before connect.
async fn connect_stream(addr: SocketAddr) -> Result<TcpStream, SetupError> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }
    .map_err(SetupError::SocketCreate)?;

    socket.set_reuseaddr(true).map_err(SetupError::SocketCreate)?;
    socket
        .connect(addr)
        .await
        .map_err(|e| SetupError::Connect { addr, source: e })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn unsignaled_gate_times_out_into_setup_failure() {
        let config = Config {
            ready_timeout: Duration::from_millis(50),
            ready_poll: Duration::from_millis(5),
            ..Config::default()
        };

        let handle = start(&config, ReadinessGate::new());
        let err = handle.join().await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Setup(SetupError::ReadyTimeout(_))
        ));
    }

    #[tokio::test]
    async fn connect_to_dead_address_is_fatal() {
        // Bind then immediately drop to get a loopback port nobody listens on.
        let dead_addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let config = Config {
            connections: 1,
            ready_timeout: Duration::from_millis(100),
            ..Config::default()
        };

        let handle = start(&config, ReadinessGate::ready(dead_addr));
        let err = handle.join().await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Setup(SetupError::Connect { .. })
        ));
    }
}
