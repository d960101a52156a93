//! k6-style live terminal display for load test progress.
//!
//! Renders a compact, in-place updating line showing active VU count,
//! completed iterations and their rate, check pass rate, P95 iteration
//! duration and elapsed time. Updates every 2 seconds from a watch channel,
//! not per-iteration.
//!
//! During the graceful stop a `[graceful stop]` prefix is shown.

use crate::loadtest::engine::DisplayState;
use crate::loadtest::metrics::{MetricKey, MetricsSnapshot, CHECKS, ITERATION_DURATION};
use crate::loadtest::vu::ActiveVuCounter;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Live status spinner on stderr.
pub struct LiveDisplay {
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let status_bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}") {
            status_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self { status_bar }
    }

    /// Format a single line of live status from a snapshot.
    ///
    /// Color coding:
    /// - Red check rate when any check failed
    /// - Yellow P95 when above one second
    pub fn format_status(
        snap: &MetricsSnapshot,
        elapsed: Duration,
        active_vus: u32,
        target_vus: u32,
        phase: Option<&str>,
    ) -> String {
        let elapsed_secs = elapsed.as_secs_f64();
        let iterations = snap.iterations();
        let per_sec = if elapsed_secs > 0.0 {
            iterations as f64 / elapsed_secs
        } else {
            0.0
        };

        let p95 = snap
            .trend(&MetricKey::new(ITERATION_DURATION))
            .map_or(0.0, |t| t.p95);
        let p95_str = format!("{p95:.0}ms");
        let p95_display = if p95 > 1000.0 {
            p95_str.yellow().to_string()
        } else {
            p95_str.green().to_string()
        };

        let checks_display = match snap.rate(&MetricKey::new(CHECKS)) {
            Some(rate) if rate.fails > 0 => format!("{:.1}%", rate.rate() * 100.0).red().to_string(),
            Some(rate) => format!("{:.1}%", rate.rate() * 100.0).green().to_string(),
            None => "-".to_string(),
        };

        let metrics_line = format!(
            "vus: {}  |  iterations: {} ({:.1}/s)  |  checks: {}  |  p95: {}  |  elapsed: {}s",
            format!("{active_vus}/{target_vus}").green(),
            iterations,
            per_sec,
            checks_display,
            p95_display,
            elapsed.as_secs()
        );

        match phase {
            Some(label) => format!("  [{label}]  {metrics_line}"),
            None => format!("  {metrics_line}"),
        }
    }

    /// Update the display with the latest snapshot.
    pub fn update(&self, state: &DisplayState, elapsed: Duration, active_vus: u32, target_vus: u32) {
        let msg = Self::format_status(
            &state.snapshot,
            elapsed,
            active_vus,
            target_vus,
            state.phase.as_deref(),
        );
        self.status_bar.set_message(msg);
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop.
///
/// Subscribes to the watch channel receiving [`DisplayState`] and updates the
/// terminal on each published snapshot. Stops when the [`CancellationToken`]
/// is cancelled or the watch sender is dropped.
pub async fn display_loop(
    mut display_rx: watch::Receiver<DisplayState>,
    active_vus: ActiveVuCounter,
    target_vus: u32,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    // Sender dropped, test is ending
                    break;
                }
                let state = display_rx.borrow_and_update().clone();
                display.update(&state, test_start.elapsed(), active_vus.get(), target_vus);
            }
            _ = cancel.cancelled() => {
                let state = display_rx.borrow().clone();
                display.update(&state, test_start.elapsed(), active_vus.get(), target_vus);
                break;
            }
        }
    }

    display.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{MetricsRecorder, Observation, ITERATIONS};

    fn snapshot(observations: &[Observation]) -> MetricsSnapshot {
        let mut recorder = MetricsRecorder::new();
        for observation in observations {
            recorder.record(observation);
        }
        recorder.snapshot()
    }

    #[test]
    fn test_format_status_zero_state() {
        colored::control::set_override(false);
        let status =
            LiveDisplay::format_status(&MetricsSnapshot::default(), Duration::ZERO, 0, 10, None);

        assert!(status.contains("0/10"), "Should contain VU count 0/10, got: {status}");
        assert!(status.contains("(0.0/s)"), "Should contain rate 0.0, got: {status}");
        assert!(status.contains("checks: -"), "No checks yet, got: {status}");
    }

    #[test]
    fn test_format_status_with_data() {
        colored::control::set_override(false);
        let snap = snapshot(&[
            Observation::increment(ITERATIONS, 20),
            Observation::sample(ITERATION_DURATION, 42.0),
            Observation::outcome(CHECKS, true).with_tag("check", "a"),
            Observation::outcome(CHECKS, false).with_tag("check", "b"),
        ]);
        let status = LiveDisplay::format_status(&snap, Duration::from_secs(10), 10, 10, None);

        assert!(status.contains("iterations: 20 (2.0/s)"), "got: {status}");
        assert!(status.contains("checks: 50.0%"), "got: {status}");
        assert!(status.contains("p95: 42ms"), "got: {status}");
        assert!(!status.contains('['), "No phase label, got: {status}");
    }

    #[test]
    fn test_format_status_with_phase_label() {
        let status = LiveDisplay::format_status(
            &MetricsSnapshot::default(),
            Duration::from_secs(10),
            5,
            10,
            Some("graceful stop"),
        );
        assert!(status.contains("[graceful stop]"), "got: {status}");
        assert!(status.contains("vus:"), "got: {status}");
    }

    #[test]
    fn test_live_display_new_does_not_panic() {
        let display = LiveDisplay::new(true);
        display.finish();
    }
}
