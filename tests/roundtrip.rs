//! End-to-end runs over real loopback sockets.
//!
//! Each test binds an OS-chosen ephemeral port (`port = 0`); the readiness
//! gate hands the real address to the client side, so tests never collide
//! on a fixed port.

use std::net::SocketAddr;
use std::time::Duration;

use roundtrip::config::Config;
use roundtrip::error::{HarnessError, SetupError};
use roundtrip::harness;
use roundtrip::worker::WorkerState;

fn loopback_config(connections: usize, payload_size: usize) -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        connections,
        payload_size,
        run_timeout: Duration::from_secs(10),
        ready_timeout: Duration::from_secs(5),
        ready_poll: Duration::from_millis(10),
        ..Config::default()
    }
}

#[tokio::test]
async fn single_connection_small_payload() {
    let report = harness::run(&loopback_config(1, 16)).await.unwrap();

    assert!(report.all_passed());
    assert_eq!(report.server.len(), 1);
    assert_eq!(report.client.len(), 1);

    let server = &report.server[0];
    assert_eq!(server.state, WorkerState::Done);
    assert_eq!(server.bytes_received, 16);
    assert_eq!(server.bytes_sent, 16);

    // The client verified the echo against the bytes it sent.
    let client = &report.client[0];
    assert_eq!(client.bytes_sent, 16);
    assert_eq!(client.bytes_received, 16);
    assert!(client.error.is_none());
}

#[tokio::test]
async fn ten_connections_full_payload() {
    let report = harness::run(&loopback_config(10, 1000)).await.unwrap();

    assert!(report.all_passed());
    assert_eq!(report.failed(), 0);
    assert_eq!(report.server.len(), 10);
    assert_eq!(report.client.len(), 10);

    for outcome in report.server.iter().chain(report.client.iter()) {
        assert_eq!(outcome.state, WorkerState::Done);
        assert_eq!(outcome.bytes_sent, 1000);
        assert_eq!(outcome.bytes_received, 1000);
    }
}

#[tokio::test]
async fn payload_larger_than_socket_buffers() {
    // Forces both sides through many partial reads and writes.
    let report = harness::run(&loopback_config(2, 1 << 20)).await.unwrap();

    assert!(report.all_passed());
    assert_eq!(report.server.len(), 2);
    assert_eq!(report.client.len(), 2);
}

#[tokio::test]
async fn occupied_port_fails_setup_without_hanging() {
    let occupant = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupant.local_addr().unwrap();

    let config = Config {
        addr,
        run_timeout: Duration::from_secs(5),
        ..loopback_config(1, 16)
    };

    let start = std::time::Instant::now();
    let err = harness::run(&config).await.unwrap_err();

    assert!(matches!(
        err,
        HarnessError::Setup(SetupError::Bind { .. })
    ));
    // Setup failure short-circuits the run; nothing waits out a deadline.
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn client_mode_fails_against_dead_server() {
    // Bind then drop, so the port exists but nobody listens.
    let dead_addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let config = Config {
        addr: dead_addr,
        connections: 1,
        run_timeout: Duration::from_secs(5),
        ..loopback_config(1, 16)
    };

    let err = harness::run_client(&config).await.unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Setup(SetupError::Connect { .. })
    ));
}

#[tokio::test]
async fn deadline_aborts_a_stalled_run() {
    // One connection slot, no client ever arrives: the accept loop stalls
    // until the deadline trips.
    let config = Config {
        run_timeout: Duration::from_millis(200),
        ..loopback_config(1, 16)
    };

    let err = harness::run_server(&config).await.unwrap_err();
    assert!(matches!(err, HarnessError::Timeout { .. }));
}
