//! roundtrip: a concurrent TCP round-trip stress test harness.
//!
//! Modes:
//! - harness: server and client sides in one process over loopback
//! - server: listen and echo only
//! - client: connect and send only
//!
//! Exit codes: 0 all workers passed, 1 test or setup failure, 2 broken
//! synchronization substrate.

use roundtrip::config::{Config, Mode};
use roundtrip::harness;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("roundtrip: {e}");
            std::process::exit(1);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        mode = ?config.mode,
        addr = %config.addr,
        connections = config.connections,
        payload_size = config.payload_size,
        "starting roundtrip"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build runtime");
            std::process::exit(1);
        }
    };

    let code = runtime.block_on(run(config));
    std::process::exit(code);
}

async fn run(config: Config) -> i32 {
    let result = match config.mode {
        Mode::Harness => harness::run(&config).await,
        Mode::Server => harness::run_server(&config).await,
        Mode::Client => harness::run_client(&config).await,
    };

    match result {
        Ok(report) => {
            report.log_summary();
            if report.all_passed() {
                info!("run passed");
                0
            } else {
                error!(failed = report.failed(), "run failed");
                1
            }
        }
        Err(e) => {
            error!(error = %e, "run aborted");
            e.exit_code()
        }
    }
}
