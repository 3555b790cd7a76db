//! roundtrip: a concurrent TCP round-trip stress test harness.
//!
//! One process plays server and client simultaneously over loopback TCP:
//! - the server side binds, signals readiness, accepts N connections, and
//!   echoes back every byte it receives;
//! - the client side waits on the readiness gate, opens N connections, and
//!   pushes a fixed-size payload through each in randomly sized chunks,
//!   verifying the echo byte-for-byte;
//! - the harness joins all workers under a deadline and reports aggregate
//!   pass/fail.
//!
//! Entry points: [`harness::run`] for the combined run, and
//! [`harness::run_server`] / [`harness::run_client`] for the standalone
//! modes.

pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod harness;
pub mod server;
pub mod transfer;
pub mod worker;
