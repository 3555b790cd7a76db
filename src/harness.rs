//! Combined-run driver.
//!
//! Starts both supervisors against one in-process loopback listener, joins
//! everything under a single deadline, and aggregates per-worker outcomes
//! into a pass/fail report.

use tokio::time::timeout;
use tracing::{info, warn};

use crate::client;
use crate::config::Config;
use crate::error::HarnessError;
use crate::gate::ReadinessGate;
use crate::server;
use crate::worker::WorkerOutcome;

/// Aggregate result of one run. Standalone modes leave the other side
/// empty.
#[derive(Debug)]
pub struct RunReport {
    pub server: Vec<WorkerOutcome>,
    pub client: Vec<WorkerOutcome>,
}

impl RunReport {
    pub fn passed(&self) -> usize {
        self.outcomes().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().filter(|o| !o.passed()).count()
    }

    pub fn all_passed(&self) -> bool {
        self.outcomes().all(|o| o.passed())
    }

    fn outcomes(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.server.iter().chain(self.client.iter())
    }

    /// Log per-side counts and every failure cause.
    pub fn log_summary(&self) {
        for (side, outcomes) in [("server", &self.server), ("client", &self.client)] {
            if outcomes.is_empty() {
                continue;
            }
            let passed = outcomes.iter().filter(|o| o.passed()).count();
            info!(
                side,
                passed,
                failed = outcomes.len() - passed,
                "workers finished"
            );
            for outcome in outcomes.iter().filter(|o| !o.passed()) {
                if let Some(error) = &outcome.error {
                    warn!(
                        side,
                        index = outcome.index,
                        peer = %outcome.peer,
                        error = %error,
                        "worker failure"
                    );
                }
            }
        }
    }
}

/// Run server and client sides in one process and join everything.
///
/// The deadline covers the whole run; on expiry both supervisors are
/// aborted, which drops their worker registries and closes every remaining
/// socket, so no blocked I/O outlives the run.
pub async fn run(config: &Config) -> Result<RunReport, HarnessError> {
    let gate = ReadinessGate::new();

    let server = server::start(config, gate.clone())?;
    let client = client::start(config, gate);

    let server_abort = server.abort_handle();
    let client_abort = client.abort_handle();

    let joined = timeout(config.run_timeout, async {
        let server_outcomes = server.join().await;
        let client_outcomes = client.join().await;
        (server_outcomes, client_outcomes)
    })
    .await;

    match joined {
        Ok((server_outcomes, client_outcomes)) => Ok(RunReport {
            server: server_outcomes?,
            client: client_outcomes?,
        }),
        Err(_) => {
            server_abort.abort();
            client_abort.abort();
            Err(HarnessError::Timeout {
                limit: config.run_timeout,
            })
        }
    }
}

/// Serve one run's worth of connections for a client in another process.
pub async fn run_server(config: &Config) -> Result<RunReport, HarnessError> {
    let handle = server::start(config, ReadinessGate::new())?;
    let abort = handle.abort_handle();

    match timeout(config.run_timeout, handle.join()).await {
        Ok(outcomes) => Ok(RunReport {
            server: outcomes?,
            client: Vec::new(),
        }),
        Err(_) => {
            abort.abort();
            Err(HarnessError::Timeout {
                limit: config.run_timeout,
            })
        }
    }
}

/// Drive one run's worth of connections against a server in another
/// process at the configured address.
pub async fn run_client(config: &Config) -> Result<RunReport, HarnessError> {
    let handle = client::start(config, ReadinessGate::ready(config.addr));
    let abort = handle.abort_handle();

    match timeout(config.run_timeout, handle.join()).await {
        Ok(outcomes) => Ok(RunReport {
            server: Vec::new(),
            client: outcomes?,
        }),
        Err(_) => {
            abort.abort();
            Err(HarnessError::Timeout {
                limit: config.run_timeout,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::{Role, WorkerState};
    use std::net::SocketAddr;
    use std::time::Duration;

    fn outcome(index: usize, state: WorkerState) -> WorkerOutcome {
        WorkerOutcome {
            index,
            role: Role::Client,
            peer: SocketAddr::from(([127, 0, 0, 1], 9)),
            state,
            bytes_sent: 0,
            bytes_received: 0,
            error: None,
        }
    }

    #[test]
    fn report_counts_both_sides() {
        let report = RunReport {
            server: vec![outcome(0, WorkerState::Done)],
            client: vec![outcome(0, WorkerState::Done), outcome(1, WorkerState::Failed)],
        };

        assert_eq!(report.passed(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_passed());
    }

    #[tokio::test]
    async fn server_without_clients_hits_the_deadline() {
        let config = Config {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            connections: 1,
            run_timeout: Duration::from_millis(100),
            ..Config::default()
        };

        let err = run_server(&config).await.unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }));
    }
}
