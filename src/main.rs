//! rrbench: request/response round-trip latency benchmark
//!
//! One binary, two roles:
//! - `rrbench srv <addr>` echoes fixed-size responses to fixed-size requests
//! - `rrbench cli <addr>` pipelines requests and reports latency statistics
//!
//! Both TCP and UDP are supported. Configuration comes from CLI arguments
//! with an optional TOML file underneath.

mod address;
mod client;
mod config;
mod error;
mod protocol;
mod runtime;
mod server;
mod stats;

use config::{ClientConfig, Config, ConfigError, Mode, ReportFormat, ServerConfig};
use error::{Error, Result};
use server::Server;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(Error::Config(ConfigError::Args(e))) if !e.use_stderr() => e.exit(),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging. stdout is reserved for the report.
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match config.mode {
        Mode::Server(config) => run_server(config),
        Mode::Client(config) => run_client(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "rrbench failed");
            ExitCode::FAILURE
        }
    }
}

fn run_server(config: ServerConfig) -> Result<()> {
    info!(
        listen = %config.listen,
        keep_going = config.keep_going,
        "Starting rrbench server"
    );
    Server::bind(config)?.run()
}

fn run_client(config: &ClientConfig) -> Result<()> {
    let report = client::run(config)?;

    let rendered = match config.format {
        ReportFormat::Text => report.render_text(),
        ReportFormat::Json => report
            .render_json()
            .map_err(|e| Error::io("encode report", e.into()))?,
    };
    println!("{rendered}");
    Ok(())
}
