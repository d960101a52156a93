//! `synthload init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

use synthload::loadtest::config::FlowKind;
use synthload::loadtest::rest::DEFAULT_BASE_URL;
use synthload::loadtest::websocket::{DEFAULT_SESSION_TIMEOUT, DEFAULT_WS_URL};

/// Execute the `init` command.
///
/// Creates `.synthload/loadtest.toml` in the current directory with the
/// built-in scenario for `flow`.
pub fn execute_init(flow: FlowKind, force: bool) -> Result<()> {
    let config_path = init_in(&std::env::current_dir()?, flow, force)?;
    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your load test scenario.");
    Ok(())
}

/// Write the starter config under `base_dir`. Refuses to overwrite unless
/// `force` is set.
fn init_in(base_dir: &Path, flow: FlowKind, force: bool) -> Result<PathBuf> {
    let config_dir = base_dir.join(".synthload");
    let config_path = config_dir.join("loadtest.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    std::fs::write(&config_path, generate_template(flow))?;
    Ok(config_path)
}

const SETTINGS_TEMPLATE: &str = r#"# synthload configuration
# Run with: synthload run

[settings]
# Concurrent virtual users (constant-vus executor)
virtual_users = 10
# Run duration in seconds
duration_secs = 10
# Delay before VUs start, in seconds
start_time_secs = 0
# Per-request HTTP timeout in milliseconds
timeout_ms = 30000
# Seconds in-flight iterations may take to finish once the run ends
graceful_stop_secs = 30
# Optional cap on total iterations across all VUs
# iterations = 1000
"#;

/// Generate the starter config for `flow`.
fn generate_template(flow: FlowKind) -> String {
    let target = match flow {
        FlowKind::Rest => format!(
            r#"
[target]
type = "rest"
# GET /users/1, /posts?userId=1 and /comments?postId=1 are issued against this
base_url = "{DEFAULT_BASE_URL}"

[thresholds]
rest_success_rate = ["rate>0.95"]
rest_request_duration = ["p(95)<1000"]
"http_req_duration{{name:GetUser}}" = ["p(95)<800"]
"#
        ),
        FlowKind::WebSocket => format!(
            r#"
[target]
type = "websocket"
# Any endpoint that echoes a text frame back
url = "{DEFAULT_WS_URL}"
# Deadline per session, measured from connect
session_timeout_ms = {}

[thresholds]
websocket_success_rate = ["rate>0.85"]
websocket_session_duration = ["p(95)<2500"]
"#,
            DEFAULT_SESSION_TIMEOUT.as_millis()
        ),
    };
    format!("{SETTINGS_TEMPLATE}{target}")
}
