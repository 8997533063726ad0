//! Configuration module for rrbench.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::address::Url;
use crate::error::{Error, Result};
use crate::protocol::Sizes;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "rrbench")]
#[command(author = "rrbench authors")]
#[command(version = "0.1.0")]
#[command(about = "Request/response round-trip latency benchmark", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the server, serving one client at a time
    Srv(SrvArgs),
    /// Run a benchmark against a server
    Cli(ClientArgs),
}

#[derive(Args, Debug)]
pub struct SrvArgs {
    /// Address to bind to (e.g., tcp://*:7777, udp://0.0.0.0:7777)
    pub listen: Option<String>,

    /// Log a failed session and keep accepting instead of exiting
    #[arg(long)]
    pub keep_going: bool,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server address (e.g., tcp://127.0.0.1:7777)
    pub server: Option<String>,

    /// Requests in flight
    #[arg(short = 'b', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub burst: Option<u32>,

    /// Total number of requests to send
    #[arg(short = 'n', long, value_parser = clap::value_parser!(u32).range(1..))]
    pub nmessages: Option<u32>,

    /// Request payload size in bytes
    #[arg(short = 'q', long)]
    pub req_size: Option<u16>,

    /// Response payload size in bytes
    #[arg(short = 's', long)]
    pub res_size: Option<u16>,

    /// Connection attempts before giving up
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub connect_attempts: Option<u32>,

    /// HELO send attempts before giving up
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub handshake_attempts: Option<u32>,

    /// Tick source for latency samples
    #[arg(long, value_enum)]
    pub clock: Option<ClockKind>,

    /// Report format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,
}

/// Tick source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    #[default]
    Monotonic,
    Tsc,
}

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    /// Address to bind to
    pub listen: Option<String>,
    /// Survive failed sessions
    #[serde(default)]
    pub keep_going: bool,
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    /// Server address
    pub server: Option<String>,
    #[serde(default = "default_burst")]
    pub burst: u32,
    #[serde(default = "default_nmessages")]
    pub nmessages: u32,
    #[serde(default)]
    pub req_size: u16,
    #[serde(default)]
    pub res_size: u16,
    #[serde(default = "default_attempts")]
    pub connect_attempts: u32,
    #[serde(default = "default_attempts")]
    pub handshake_attempts: u32,
    #[serde(default)]
    pub clock: ClockKind,
    #[serde(default)]
    pub format: ReportFormat,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server: None,
            burst: default_burst(),
            nmessages: default_nmessages(),
            req_size: 0,
            res_size: 0,
            connect_attempts: default_attempts(),
            handshake_attempts: default_attempts(),
            clock: ClockKind::default(),
            format: ReportFormat::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_burst() -> u32 {
    1
}

fn default_nmessages() -> u32 {
    1024
}

fn default_attempts() -> u32 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen: Url,
    pub keep_going: bool,
}

/// Resolved client run configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server: Url,
    pub burst: u32,
    pub nmessages: u32,
    pub sizes: Sizes,
    pub connect_attempts: u32,
    pub handshake_attempts: u32,
    pub clock: ClockKind,
    pub format: ReportFormat,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Server(ServerConfig),
    Client(ClientConfig),
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self> {
        let cli = CliArgs::try_parse().map_err(ConfigError::Args)?;
        Self::from_args(cli)
    }

    /// Read the TOML file named by `cli`, if any, and merge.
    pub fn from_args(cli: CliArgs) -> Result<Self> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self> {
        let log_level = cli.log_level.unwrap_or(toml_config.logging.level);

        let mode = match cli.command {
            Command::Srv(args) => {
                let listen = args
                    .listen
                    .or(toml_config.server.listen)
                    .ok_or_else(|| Error::Usage("missing server bind address".to_string()))?;
                Mode::Server(ServerConfig {
                    listen: parse_url(&listen)?,
                    keep_going: args.keep_going || toml_config.server.keep_going,
                })
            }
            Command::Cli(args) => {
                let file = toml_config.client;
                let server = args
                    .server
                    .or(file.server)
                    .ok_or_else(|| Error::Usage("missing server address".to_string()))?;

                let config = ClientConfig {
                    server: parse_url(&server)?,
                    burst: args.burst.unwrap_or(file.burst),
                    nmessages: args.nmessages.unwrap_or(file.nmessages),
                    sizes: Sizes::new(
                        args.req_size.unwrap_or(file.req_size),
                        args.res_size.unwrap_or(file.res_size),
                    ),
                    connect_attempts: args.connect_attempts.unwrap_or(file.connect_attempts),
                    handshake_attempts: args.handshake_attempts.unwrap_or(file.handshake_attempts),
                    clock: args.clock.unwrap_or(file.clock),
                    format: args.format.unwrap_or(file.format),
                };
                config.validate()?;
                Mode::Client(config)
            }
        };

        Ok(Config { mode, log_level })
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<()> {
        if self.burst < 1 {
            return Err(Error::Usage("burst specified is < 1".to_string()));
        }
        if self.nmessages < 1 {
            return Err(Error::Usage("nmessages specified is < 1".to_string()));
        }
        if self.connect_attempts < 1 || self.handshake_attempts < 1 {
            return Err(Error::Usage("attempt counts must be >= 1".to_string()));
        }
        Ok(())
    }
}

fn parse_url(s: &str) -> Result<Url> {
    s.parse()
        .map_err(|e| Error::Usage(format!("cannot parse URL '{s}': {e}")))
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    Args(#[source] clap::Error),

    #[error("Failed to read config file '{}': {1}", .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{}': {1}", .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
