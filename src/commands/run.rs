//! `synthload run` command implementation.

use anyhow::Result;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use synthload::loadtest::config::{FlowKind, LoadTestConfig};
use synthload::loadtest::engine::LoadTestEngine;
use synthload::loadtest::report::{write_report, LoadTestReport};
use synthload::loadtest::summary::render_summary;

/// CLI values that take precedence over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub target: Option<String>,
    pub vus: Option<u32>,
    pub duration: Option<u64>,
    pub iterations: Option<u64>,
}

/// Execute the `run` command.
///
/// Resolves the config, applies CLI overrides, runs the engine, prints the
/// summary and writes the report. Returns whether every threshold passed.
pub async fn execute_run(
    flow: Option<FlowKind>,
    config_path: Option<PathBuf>,
    overrides: Overrides,
    no_report: bool,
    no_color: bool,
) -> Result<bool> {
    // Step 1: Resolve config
    let cwd = std::env::current_dir()?;
    let mut config = resolve_config(flow, config_path, &cwd)?;

    // Step 2: Apply CLI overrides
    apply_overrides(&mut config, overrides);

    // Step 3: Build and run the engine
    let engine = LoadTestEngine::new(config).with_no_color(no_color);
    let result = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {}", e))?;

    // Step 4: Output k6-style terminal summary
    if no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let summary = render_summary(&result, engine.config());
    println!("{summary}");

    // Step 5: Write JSON report (unless --no-report)
    if !no_report {
        let report = LoadTestReport::from_result(&result, engine.config());
        match write_report(&report, &cwd) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                eprintln!();
                eprintln!("Warning: Failed to write report: {}", e);
                // Non-fatal -- the test still completed
            },
        }
    }

    let passed = result.thresholds_passed();
    if !passed {
        let failed = result.thresholds.iter().filter(|t| !t.passed).count();
        eprintln!();
        eprintln!("Error: {failed} threshold(s) failed");
    }
    Ok(passed)
}

/// Pick the config for this run.
///
/// An explicit `--config` must exist and, when `--flow` is also given, target
/// that flow. Otherwise a discovered `.synthload/loadtest.toml` is used if it
/// matches the requested flow; the built-in scenario fills in the rest.
fn resolve_config(
    flow: Option<FlowKind>,
    config_path: Option<PathBuf>,
    start_dir: &Path,
) -> Result<LoadTestConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse `synthload init` to create one.",
                path.display()
            );
        }
        let config = load(&path)?;
        if let Some(kind) = flow {
            if config.flow_kind() != kind {
                anyhow::bail!(
                    "--flow {kind} conflicts with config '{}', which targets {}",
                    path.display(),
                    config.flow_kind()
                );
            }
        }
        return Ok(config);
    }

    if let Some(path) = discover_config_from(start_dir) {
        let config = load(&path)?;
        match flow {
            Some(kind) if kind != config.flow_kind() => {
                eprintln!(
                    "Ignoring {} (targets {}); using built-in {kind} scenario",
                    path.display(),
                    config.flow_kind()
                );
            },
            _ => return Ok(config),
        }
    }

    let kind = flow.unwrap_or(FlowKind::Rest);
    tracing::debug!("Using built-in {kind} scenario");
    Ok(LoadTestConfig::default_for(kind))
}

fn load(path: &Path) -> Result<LoadTestConfig> {
    eprintln!("Loading config from: {}", path.display());
    LoadTestConfig::load(path)
        .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path.display(), e))
}

/// Apply CLI flag overrides to a loaded config.
fn apply_overrides(config: &mut LoadTestConfig, overrides: Overrides) {
    if let Some(target) = overrides.target {
        config.target.set_url(target);
    }
    if let Some(v) = overrides.vus {
        config.settings.virtual_users = v;
    }
    if let Some(d) = overrides.duration {
        config.settings.duration_secs = d;
    }
    if let Some(n) = overrides.iterations {
        config.settings.iterations = Some(n);
    }
}

/// Discover `.synthload/loadtest.toml` by walking parent directories.
///
/// Starts from `start` and walks up until either the file is found or the
/// filesystem root is reached. This matches `.git` directory discovery
/// semantics.
fn discover_config_from(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(".synthload").join("loadtest.toml");
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
