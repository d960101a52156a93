//! `synthload` CLI subcommands.
//!
//! Provides `run` (execute a load test) and `init` (generate starter config).

mod init;
mod run;

use anyhow::Result;
use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use synthload::loadtest::config::FlowKind;

/// Process exit status when at least one threshold failed.
pub const THRESHOLDS_FAILED_EXIT_CODE: u8 = 99;

/// Test flow selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlowArg {
    /// Three chained GETs with JSON checks
    Rest,
    /// Connect, send a probe, await the echo, close
    Websocket,
}

impl From<FlowArg> for FlowKind {
    fn from(arg: FlowArg) -> Self {
        match arg {
            FlowArg::Rest => FlowKind::Rest,
            FlowArg::Websocket => FlowKind::WebSocket,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test
    ///
    /// Uses --config, else .synthload/loadtest.toml found by walking up from
    /// the current directory, else the built-in scenario for --flow. Reports
    /// results to the terminal and writes a JSON report to .synthload/reports/.
    Run {
        /// Test flow to run (default: the config's flow, or rest)
        #[arg(long, value_enum)]
        flow: Option<FlowArg>,

        /// Path to config file (default: auto-discover .synthload/loadtest.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Target base URL (rest) or endpoint URL (websocket), overrides config
        #[arg(long, env = "SYNTHLOAD_TARGET")]
        target: Option<String>,

        /// Number of virtual users (overrides config)
        #[arg(long)]
        vus: Option<u32>,

        /// Test duration in seconds (overrides config)
        #[arg(long)]
        duration: Option<u64>,

        /// Total iteration limit across all VUs (overrides config)
        #[arg(long)]
        iterations: Option<u64>,

        /// Disable JSON report output
        #[arg(long)]
        no_report: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Generate a starter loadtest config file
    ///
    /// Creates .synthload/loadtest.toml with the built-in scenario and
    /// thresholds for the chosen flow.
    Init {
        /// Flow the config should target
        #[arg(long, value_enum, default_value = "rest")]
        flow: FlowArg,

        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

impl Command {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<ExitCode> {
        match self {
            Command::Run {
                flow,
                config,
                target,
                vus,
                duration,
                iterations,
                no_report,
                no_color,
            } => {
                let runtime = tokio::runtime::Runtime::new()?;
                let overrides = run::Overrides {
                    target,
                    vus,
                    duration,
                    iterations,
                };
                let passed = runtime.block_on(run::execute_run(
                    flow.map(FlowKind::from),
                    config,
                    overrides,
                    no_report,
                    no_color,
                ))?;
                Ok(if passed {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::from(THRESHOLDS_FAILED_EXIT_CODE)
                })
            },
            Command::Init { flow, force } => {
                init::execute_init(flow.into(), force)?;
                Ok(ExitCode::SUCCESS)
            },
        }
    }
}
