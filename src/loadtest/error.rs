//! Error types for the workload driver.
//!
//! Defines [`LoadTestError`] for configuration and run-level errors and
//! [`ProbeError`] for transport and protocol failures encountered inside a
//! single iteration. A [`ProbeError`] never leaves an iteration: flows turn it
//! into a failed outcome and a diagnostic.

/// Errors that occur during configuration parsing, validation, or file I/O.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., zero VUs, a non-WebSocket URL).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// A threshold expression or metric selector could not be parsed.
    #[error("Invalid threshold '{expression}': {reason}")]
    Threshold { expression: String, reason: String },
}

/// Transport and protocol errors encountered while executing one iteration.
///
/// Each variant represents a distinct error category that diagnostics and
/// reports can count separately.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// HTTP transport error carrying the status code the server answered with.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request or handshake exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// WebSocket protocol error reported after the connection was established.
    #[error("WebSocket error: {message}")]
    WebSocket { message: String },
}

impl ProbeError {
    /// Returns the error category as a static string for classification.
    ///
    /// Categories: `"http"`, `"timeout"`, `"connection"`, `"websocket"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::WebSocket { .. } => "websocket",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`ProbeError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }

    /// Classify a WebSocket transport error.
    ///
    /// Errors raised before the upgrade completed (I/O, TLS, URL, handshake
    /// HTTP responses) are connection failures; everything else is a
    /// protocol-level session error.
    pub fn classify_ws(err: &tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => Self::Timeout,
            WsError::Io(_) | WsError::Tls(_) | WsError::Url(_) => Self::Connection {
                message: err.to_string(),
            },
            WsError::Http(response) => Self::Http {
                status: response.status().as_u16(),
                body: err.to_string(),
            },
            _ => Self::WebSocket {
                message: err.to_string(),
            },
        }
    }
}
