//! Synthetic load testing engine.
//!
//! Two test flows (a REST check pipeline and a WebSocket echo session) run
//! under a constant-vus executor. Flows report into an injected
//! [`metrics::MetricSink`]; the engine aggregates observations into
//! HdrHistogram-backed trends, rates and counters, then evaluates k6-style
//! thresholds over the result.

pub mod config;
pub mod context;
pub mod decode;
pub mod display;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod report;
pub mod rest;
pub mod session;
pub mod summary;
pub mod thresholds;
pub mod vu;
pub mod websocket;
