//! Configuration for the harness.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

/// Which side(s) of the exchange this process runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Both sides in one process over loopback.
    Harness,
    /// Listen and echo only; a client connects from elsewhere.
    Server,
    /// Connect and send only, against a server elsewhere.
    Client,
}

/// Command-line arguments for the harness
#[derive(Parser, Debug)]
#[command(name = "roundtrip")]
#[command(version = "0.1.0")]
#[command(about = "A concurrent TCP round-trip stress test harness", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Run mode
    #[arg(long, value_enum, default_value = "harness")]
    pub mode: Mode,

    /// Address to bind (server/harness) or connect to (client)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port; 0 picks an ephemeral port in harness mode
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of concurrent connections
    #[arg(short = 'n', long)]
    pub connections: Option<usize>,

    /// Payload size in bytes exchanged per connection
    #[arg(short = 's', long)]
    pub payload_size: Option<usize>,

    /// Listen backlog (defaults to the connection count)
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Overall run deadline in seconds
    #[arg(long)]
    pub run_timeout: Option<u64>,

    /// Skip client-side verification of the echoed payload
    #[arg(long)]
    pub no_verify: bool,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub net: NetConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network-related configuration
#[derive(Debug, Deserialize)]
pub struct NetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog; defaults to the connection count
    pub backlog: Option<u32>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            backlog: None,
        }
    }
}

/// Transfer-related configuration
#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_connections")]
    pub connections: usize,
    #[serde(default = "default_payload_size")]
    pub payload_size: usize,
    #[serde(default = "default_verify_echo")]
    pub verify_echo: bool,
    /// Overall run deadline in seconds
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// How long the client side waits for server readiness, in seconds
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    /// Readiness re-check interval in milliseconds
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            payload_size: default_payload_size(),
            verify_echo: default_verify_echo(),
            run_timeout_secs: default_run_timeout_secs(),
            ready_timeout_secs: default_ready_timeout_secs(),
            ready_poll_ms: default_ready_poll_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    10900
}

fn default_connections() -> usize {
    10
}

fn default_payload_size() -> usize {
    1000
}

fn default_verify_echo() -> bool {
    true
}

fn default_run_timeout_secs() -> u64 {
    30
}

fn default_ready_timeout_secs() -> u64 {
    10
}

fn default_ready_poll_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub addr: SocketAddr,
    pub backlog: u32,
    pub connections: usize,
    pub payload_size: usize,
    pub verify_echo: bool,
    pub run_timeout: Duration,
    pub ready_timeout: Duration,
    pub ready_poll: Duration,
    pub workers: Option<usize>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    fn resolve(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let host = cli.host.unwrap_or(file.net.host);
        let port = cli.port.unwrap_or(file.net.port);
        let ip: IpAddr = host
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(host.clone(), e))?;

        let connections = cli.connections.unwrap_or(file.transfer.connections);
        if connections == 0 {
            return Err(ConfigError::Invalid(
                "connections must be at least 1".to_string(),
            ));
        }

        let payload_size = cli.payload_size.unwrap_or(file.transfer.payload_size);
        if payload_size == 0 {
            return Err(ConfigError::Invalid(
                "payload size must be at least 1 byte".to_string(),
            ));
        }

        Ok(Config {
            mode: cli.mode,
            addr: SocketAddr::new(ip, port),
            backlog: cli
                .backlog
                .or(file.net.backlog)
                .unwrap_or(connections as u32),
            connections,
            payload_size,
            verify_echo: !cli.no_verify && file.transfer.verify_echo,
            run_timeout: Duration::from_secs(
                cli.run_timeout.unwrap_or(file.transfer.run_timeout_secs),
            ),
            ready_timeout: Duration::from_secs(file.transfer.ready_timeout_secs),
            ready_poll: Duration::from_millis(file.transfer.ready_poll_ms),
            workers: cli.workers,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                file.logging.level
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::Harness,
            addr: SocketAddr::from(([127, 0, 0, 1], default_port())),
            backlog: default_connections() as u32,
            connections: default_connections(),
            payload_size: default_payload_size(),
            verify_echo: default_verify_echo(),
            run_timeout: Duration::from_secs(default_run_timeout_secs()),
            ready_timeout: Duration::from_secs(default_ready_timeout_secs()),
            ready_poll: Duration::from_millis(default_ready_poll_ms()),
            workers: None,
            log_level: default_log_level(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{0}': {1}")]
    TomlParse(PathBuf, #[source] toml::de::Error),

    #[error("invalid host address '{0}': {1}")]
    InvalidAddress(String, #[source] std::net::AddrParseError),

    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> CliArgs {
        CliArgs {
            config: None,
            mode: Mode::Harness,
            host: None,
            port: None,
            connections: None,
            payload_size: None,
            backlog: None,
            run_timeout: None,
            no_verify: false,
            workers: None,
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.net.host, "127.0.0.1");
        assert_eq!(config.net.port, 10900);
        assert_eq!(config.transfer.connections, 10);
        assert_eq!(config.transfer.payload_size, 1000);
        assert!(config.transfer.verify_echo);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [net]
            host = "0.0.0.0"
            port = 12000
            backlog = 128

            [transfer]
            connections = 50
            payload_size = 4096
            verify_echo = false
            run_timeout_secs = 60

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.net.host, "0.0.0.0");
        assert_eq!(config.net.port, 12000);
        assert_eq!(config.net.backlog, Some(128));
        assert_eq!(config.transfer.connections, 50);
        assert_eq!(config.transfer.payload_size, 4096);
        assert!(!config.transfer.verify_echo);
        assert_eq!(config.transfer.run_timeout_secs, 60);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_file() {
        let cli = CliArgs {
            port: Some(9100),
            connections: Some(3),
            ..bare_cli()
        };
        let file: TomlConfig = toml::from_str(
            r#"
            [net]
            port = 12000

            [transfer]
            connections = 50
            payload_size = 4096
        "#,
        )
        .unwrap();

        let config = Config::resolve(cli, file).unwrap();
        assert_eq!(config.addr.port(), 9100);
        assert_eq!(config.connections, 3);
        // Untouched by CLI, kept from the file.
        assert_eq!(config.payload_size, 4096);
        // Backlog follows the resolved connection count.
        assert_eq!(config.backlog, 3);
    }

    #[test]
    fn test_zero_connections_rejected() {
        let cli = CliArgs {
            connections: Some(0),
            ..bare_cli()
        };
        let err = Config::resolve(cli, TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_host_rejected() {
        let cli = CliArgs {
            host: Some("not-an-ip".to_string()),
            ..bare_cli()
        };
        let err = Config::resolve(cli, TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress(..)));
    }
}
