//! TOML-based load test configuration.
//!
//! A config names one target flow, the constant-vus scenario that drives it
//! and the thresholds evaluated after the run.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! virtual_users = 10
//! duration_secs = 10
//! timeout_ms = 30000
//!
//! [target]
//! type = "rest"
//! base_url = "https://jsonplaceholder.typicode.com"
//!
//! [thresholds]
//! rest_success_rate = ["rate>0.95"]
//! rest_request_duration = ["p(95)<1000"]
//! "http_req_duration{name:GetUser}" = ["p(95)<800"]
//! ```
//!
//! A WebSocket target looks like:
//!
//! ```toml
//! [target]
//! type = "websocket"
//! url = "wss://echo.websocket.org"
//! session_timeout_ms = 5000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;
use crate::loadtest::rest::{DEFAULT_BASE_URL, REST_REQUEST_DURATION, REST_SUCCESS_RATE};
use crate::loadtest::thresholds::{parse_thresholds, Threshold};
use crate::loadtest::websocket::{
    DEFAULT_SESSION_TIMEOUT, DEFAULT_WS_URL, WEBSOCKET_SESSION_DURATION, WEBSOCKET_SUCCESS_RATE,
};

/// Which test flow a config drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Rest,
    #[serde(rename = "websocket")]
    WebSocket,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => f.write_str("rest"),
            Self::WebSocket => f.write_str("websocket"),
        }
    }
}

/// Top-level load test configuration parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadTestConfig {
    /// Scenario settings.
    pub settings: Settings,
    /// The system under test.
    pub target: Target,
    /// Metric selector to threshold expressions.
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,
}

/// Constant-vus scenario settings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Number of concurrent virtual users.
    pub virtual_users: u32,
    /// Run duration in seconds.
    pub duration_secs: u64,
    /// Delay before the first VU starts, in seconds.
    #[serde(default)]
    pub start_time_secs: u64,
    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// How long in-flight iterations may finish once the run ends, in seconds.
    #[serde(default = "default_graceful_stop_secs")]
    pub graceful_stop_secs: u64,
    /// Optional cap on total iterations across all VUs. Whichever of this and
    /// `duration_secs` is reached first ends the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u64>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_graceful_stop_secs() -> u64 {
    30
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_session_timeout_ms() -> u64 {
    DEFAULT_SESSION_TIMEOUT.as_millis() as u64
}

/// The system under test. The `type` field selects the flow.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Target {
    /// The three-step REST check pipeline.
    #[serde(rename = "rest")]
    Rest {
        #[serde(default = "default_base_url")]
        base_url: String,
    },
    /// The WebSocket echo session.
    #[serde(rename = "websocket")]
    WebSocket {
        #[serde(default = "default_ws_url")]
        url: String,
        #[serde(default = "default_session_timeout_ms")]
        session_timeout_ms: u64,
    },
}

impl Target {
    pub fn kind(&self) -> FlowKind {
        match self {
            Self::Rest { .. } => FlowKind::Rest,
            Self::WebSocket { .. } => FlowKind::WebSocket,
        }
    }

    /// Base URL or endpoint URL, depending on the flow.
    pub fn url(&self) -> &str {
        match self {
            Self::Rest { base_url } => base_url,
            Self::WebSocket { url, .. } => url,
        }
    }

    pub fn set_url(&mut self, new_url: String) {
        match self {
            Self::Rest { base_url } => *base_url = new_url,
            Self::WebSocket { url, .. } => *url = new_url,
        }
    }
}

impl LoadTestConfig {
    /// The REST scenario: 10 VUs for 10 s with its three thresholds.
    pub fn rest_default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(REST_SUCCESS_RATE.to_string(), vec!["rate>0.95".to_string()]);
        thresholds.insert(REST_REQUEST_DURATION.to_string(), vec!["p(95)<1000".to_string()]);
        thresholds.insert(
            "http_req_duration{name:GetUser}".to_string(),
            vec!["p(95)<800".to_string()],
        );

        Self {
            settings: Settings::default(),
            target: Target::Rest {
                base_url: default_base_url(),
            },
            thresholds,
        }
    }

    /// The WebSocket scenario: 10 VUs for 10 s with its two thresholds.
    pub fn websocket_default() -> Self {
        let mut thresholds = BTreeMap::new();
        thresholds.insert(WEBSOCKET_SUCCESS_RATE.to_string(), vec!["rate>0.85".to_string()]);
        thresholds.insert(
            WEBSOCKET_SESSION_DURATION.to_string(),
            vec!["p(95)<2500".to_string()],
        );

        Self {
            settings: Settings::default(),
            target: Target::WebSocket {
                url: default_ws_url(),
                session_timeout_ms: default_session_timeout_ms(),
            },
            thresholds,
        }
    }

    /// Built-in config for `kind`.
    pub fn default_for(kind: FlowKind) -> Self {
        match kind {
            FlowKind::Rest => Self::rest_default(),
            FlowKind::WebSocket => Self::websocket_default(),
        }
    }

    /// Parse a TOML string into a validated [`LoadTestConfig`].
    ///
    /// Returns an error if the TOML is malformed or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn flow_kind(&self) -> FlowKind {
        self.target.kind()
    }

    /// Parsed threshold rules.
    pub fn parsed_thresholds(&self) -> Result<Vec<Threshold>, LoadTestError> {
        parse_thresholds(&self.thresholds)
    }

    /// Validate that the config is semantically correct.
    ///
    /// Checks:
    /// - `virtual_users` and `duration_secs` are positive
    /// - an `iterations` cap, if given, is positive
    /// - the target URL parses and has a scheme matching the flow
    /// - a WebSocket `session_timeout_ms` is positive
    /// - every threshold selector and expression parses
    pub fn validate(&self) -> Result<(), LoadTestError> {
        let invalid = |message: String| Err(LoadTestError::ConfigValidation { message });

        if self.settings.virtual_users == 0 {
            return invalid("settings.virtual_users must be greater than 0".to_string());
        }
        if self.settings.duration_secs == 0 {
            return invalid("settings.duration_secs must be greater than 0".to_string());
        }
        if self.settings.iterations == Some(0) {
            return invalid("settings.iterations must be greater than 0 when set".to_string());
        }

        let (url, schemes): (&str, &[&str]) = match &self.target {
            Target::Rest { base_url } => (base_url, &["http", "https"]),
            Target::WebSocket {
                url,
                session_timeout_ms,
            } => {
                if *session_timeout_ms == 0 {
                    return invalid("target.session_timeout_ms must be greater than 0".to_string());
                }
                (url, &["ws", "wss"])
            },
        };

        let parsed = match url::Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return invalid(format!("target URL '{url}' is invalid: {e}")),
        };
        if !schemes.contains(&parsed.scheme()) {
            return invalid(format!(
                "target URL '{url}' must use one of: {}",
                schemes.join(", ")
            ));
        }

        self.parsed_thresholds()?;
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            virtual_users: 10,
            duration_secs: 10,
            start_time_secs: 0,
            timeout_ms: default_timeout_ms(),
            graceful_stop_secs: default_graceful_stop_secs(),
            iterations: None,
        }
    }
}

impl Settings {
    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_time_secs)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_secs(self.graceful_stop_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_rest_config() {
        let toml_str = r#"
[settings]
virtual_users = 5
duration_secs = 30
timeout_ms = 2000

[target]
type = "rest"
base_url = "http://localhost:8080"

[thresholds]
rest_success_rate = ["rate>0.95"]
"http_req_duration{name:GetUser}" = ["p(95)<800", "max<2000"]
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.settings.virtual_users, 5);
        assert_eq!(config.settings.duration_secs, 30);
        assert_eq!(config.settings.timeout_ms, 2000);
        assert_eq!(config.settings.graceful_stop_secs, 30);
        assert_eq!(config.settings.start_time_secs, 0);
        assert_eq!(config.flow_kind(), FlowKind::Rest);
        assert_eq!(config.target.url(), "http://localhost:8080");
        assert_eq!(config.parsed_thresholds().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_websocket_config_with_defaults() {
        let toml_str = r#"
[settings]
virtual_users = 2
duration_secs = 5

[target]
type = "websocket"
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        assert_eq!(
            config.target,
            Target::WebSocket {
                url: DEFAULT_WS_URL.to_string(),
                session_timeout_ms: 5000,
            }
        );
        assert_eq!(config.settings.timeout_ms, 30_000);
        assert!(config.thresholds.is_empty());
    }

    #[test]
    fn test_builtin_defaults_match_declared_scenarios() {
        let rest = LoadTestConfig::rest_default();
        assert_eq!(rest.settings.virtual_users, 10);
        assert_eq!(rest.settings.duration_secs, 10);
        assert_eq!(rest.settings.start_time_secs, 0);
        assert_eq!(rest.thresholds["rest_success_rate"], vec!["rate>0.95"]);
        assert_eq!(rest.thresholds["rest_request_duration"], vec!["p(95)<1000"]);
        assert_eq!(
            rest.thresholds["http_req_duration{name:GetUser}"],
            vec!["p(95)<800"]
        );
        rest.validate().unwrap();

        let ws = LoadTestConfig::websocket_default();
        assert_eq!(ws.flow_kind(), FlowKind::WebSocket);
        assert_eq!(ws.thresholds["websocket_success_rate"], vec!["rate>0.85"]);
        assert_eq!(ws.thresholds["websocket_session_duration"], vec!["p(95)<2500"]);
        ws.validate().unwrap();
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        for kind in [FlowKind::Rest, FlowKind::WebSocket] {
            let config = LoadTestConfig::default_for(kind);
            let text = toml::to_string(&config).unwrap();
            assert_eq!(LoadTestConfig::from_toml(&text).unwrap(), config);
        }
    }

    #[test]
    fn test_validation_rejects_zero_vus() {
        let mut config = LoadTestConfig::rest_default();
        config.settings.virtual_users = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("virtual_users"), "{err}");
    }

    #[test]
    fn test_validation_rejects_zero_duration_and_iterations() {
        let mut config = LoadTestConfig::rest_default();
        config.settings.duration_secs = 0;
        assert!(config.validate().is_err());

        let mut config = LoadTestConfig::rest_default();
        config.settings.iterations = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_wrong_scheme() {
        let mut config = LoadTestConfig::rest_default();
        config.target.set_url("ws://localhost:1".to_string());
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::ConfigValidation { .. })
        ));

        let mut config = LoadTestConfig::websocket_default();
        config.target.set_url("https://example.com".to_string());
        assert!(config.validate().is_err());

        config.target.set_url("not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_session_timeout() {
        let mut config = LoadTestConfig::websocket_default();
        config.target = Target::WebSocket {
            url: DEFAULT_WS_URL.to_string(),
            session_timeout_ms: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_threshold() {
        let mut config = LoadTestConfig::rest_default();
        config
            .thresholds
            .insert("rest_success_rate".to_string(), vec!["rate>>1".to_string()]);
        assert!(matches!(
            config.validate(),
            Err(LoadTestError::Threshold { .. })
        ));
    }

    #[test]
    fn test_unknown_target_type_is_parse_error() {
        let toml_str = r#"
[settings]
virtual_users = 1
duration_secs = 1

[target]
type = "grpc"
"#;
        assert!(matches!(
            LoadTestConfig::from_toml(toml_str),
            Err(LoadTestError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let text = toml::to_string(&LoadTestConfig::websocket_default()).unwrap();
        file.write_all(text.as_bytes()).unwrap();

        let config = LoadTestConfig::load(file.path()).unwrap();
        assert_eq!(config.flow_kind(), FlowKind::WebSocket);
    }

    #[test]
    fn test_load_missing_file() {
        let err = LoadTestConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, LoadTestError::ConfigIo { .. }));
    }

    #[test]
    fn test_settings_durations() {
        let settings = Settings {
            start_time_secs: 2,
            ..Settings::default()
        };
        assert_eq!(settings.timeout_as_duration(), Duration::from_secs(30));
        assert_eq!(settings.duration(), Duration::from_secs(10));
        assert_eq!(settings.start_delay(), Duration::from_secs(2));
        assert_eq!(settings.graceful_stop(), Duration::from_secs(30));
    }
}
