//! synthload: synthetic workload driver for REST and WebSocket endpoints.
//!
//! Runs k6-style constant-vus scenarios against a REST check pipeline or a
//! WebSocket echo endpoint, prints a terminal summary, writes a JSON report
//! and exits with status 99 when any threshold fails.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

/// Synthetic workload driver with k6-style thresholds
#[derive(Parser)]
#[command(name = "synthload")]
#[command(about = "Load test REST and WebSocket endpoints with k6-style thresholds", long_about = None)]
#[command(version)]
struct Cli {
    /// Log iteration and connection events to stderr (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // reqwest and tokio-tungstenite both reach rustls; pin one provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    cli.command.execute()
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "synthload=debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
