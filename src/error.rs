//! Error taxonomy for the harness.
//!
//! Two blast radii:
//! - `SetupError`: the test topology could not be established; aborts the
//!   whole run.
//! - `TransferError`: one connection's exchange failed; recorded in that
//!   worker's outcome and never propagated to sibling workers.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Failures while establishing the test topology.
///
/// Any of these is fatal to the run: with fewer than the configured number
/// of connections the test result would be meaningless.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("accept failed after {attempts} attempts: {source}")]
    Accept {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server was not ready within {0:?}")]
    ReadyTimeout(Duration),

    /// The concurrency substrate itself broke: a closed readiness channel
    /// or a panicked task. Retrying the run cannot help.
    #[error("synchronization failure: {0}")]
    Sync(String),
}

/// Per-connection failures during the payload exchange.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("peer closed the connection after {transferred} of {expected} bytes")]
    Closed { transferred: usize, expected: usize },

    #[error("socket I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("echoed payload differs from the sent payload at byte {offset}")]
    EchoMismatch { offset: usize },
}

/// Top-level run failures surfaced to the operator.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("run did not complete within {limit:?}")]
    Timeout { limit: Duration },

    #[error("supervisor task failed: {0}")]
    Join(String),
}

impl HarnessError {
    /// Process exit code for this failure.
    ///
    /// Sync-primitive failures get a distinct code so an operator can tell
    /// a broken environment from an ordinary failed test.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::Setup(SetupError::Sync(_)) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_failures_use_distinct_exit_code() {
        let sync = HarnessError::Setup(SetupError::Sync("channel closed".into()));
        assert_eq!(sync.exit_code(), 2);

        let timeout = HarnessError::Timeout {
            limit: Duration::from_secs(30),
        };
        assert_eq!(timeout.exit_code(), 1);
    }

    #[test]
    fn errors_render_with_context() {
        let err = TransferError::Closed {
            transferred: 4,
            expected: 10,
        };
        assert_eq!(
            err.to_string(),
            "peer closed the connection after 4 of 10 bytes"
        );
    }
}
