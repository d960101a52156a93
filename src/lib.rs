//! synthload: a synthetic workload driver for REST and WebSocket endpoints.
//!
//! The [`loadtest`] module holds everything needed to embed a run: typed
//! TOML configuration, the two test flows, the metric sink and recorder,
//! threshold evaluation and the summary/report renderers. The `synthload`
//! binary is a thin CLI over it.

pub mod loadtest;
