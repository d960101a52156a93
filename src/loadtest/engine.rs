//! Load test execution engine with metrics aggregation and graceful shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Spawns the constant-vus executor's VU tasks via [`TaskTracker`]
//! - Collects observations through a bounded mpsc channel
//! - Publishes snapshots through a watch channel for live display
//! - Coordinates graceful shutdown via [`CancellationToken`]
//! - Evaluates thresholds against the final snapshot

use crate::loadtest::config::{LoadTestConfig, Target};
use crate::loadtest::display::display_loop;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{ChannelSink, MetricsRecorder, MetricsSnapshot, Observation};
use crate::loadtest::rest::{ReqwestTransport, RestSuite};
use crate::loadtest::thresholds::{all_passed, evaluate_thresholds, ThresholdResult};
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, IterationFlow, IterationLimit};
use crate::loadtest::websocket::WebSocketProbe;

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Compile-time Send bounds verification for channel-transported types.
fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<Observation>();
    _assert_send::<MetricsSnapshot>();
    _assert_send::<DisplayState>();
}

/// Label shown by the live display while in-flight iterations drain.
pub const GRACEFUL_STOP_LABEL: &str = "graceful stop";

/// Display state published through the watch channel to the live terminal display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Current metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Current phase label (e.g. `"graceful stop"`), or `None` while running.
    pub phase: Option<String>,
}

/// Builds the flow a config targets.
///
/// REST flows share one `reqwest::Client` across all VUs; WebSocket flows
/// open a fresh connection per iteration.
pub fn build_flow(config: &LoadTestConfig) -> Arc<dyn IterationFlow> {
    match &config.target {
        Target::Rest { base_url } => {
            let transport = ReqwestTransport::new(
                reqwest::Client::new(),
                config.settings.timeout_as_duration(),
            );
            Arc::new(RestSuite::new(transport, base_url.clone()))
        },
        Target::WebSocket {
            url,
            session_timeout_ms,
        } => Arc::new(
            WebSocketProbe::new(url.clone())
                .with_session_timeout(Duration::from_millis(*session_timeout_ms)),
        ),
    }
}

/// Top-level load test engine configuration and entry point.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    flow: Arc<dyn IterationFlow>,
    no_color: bool,
    live_display: bool,
}

impl LoadTestEngine {
    /// Creates an engine running the flow described by `config.target`.
    pub fn new(config: LoadTestConfig) -> Self {
        let flow = build_flow(&config);
        Self::with_flow(config, flow)
    }

    /// Creates an engine running a caller-supplied flow. `config.target` is
    /// then only used for reporting.
    pub fn with_flow(config: LoadTestConfig, flow: Arc<dyn IterationFlow>) -> Self {
        Self {
            config,
            flow,
            no_color: false,
            live_display: true,
        }
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Enables or disables the live progress spinner.
    pub fn with_live_display(mut self, enabled: bool) -> Self {
        self.live_display = enabled;
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Scenario name of the flow being run.
    pub fn flow_name(&self) -> &str {
        self.flow.name()
    }

    /// Returns whether colored output is disabled.
    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Run the load test.
    ///
    /// The run ends at the first of: `duration_secs` elapsed, the iteration
    /// cap reached, or Ctrl+C. VUs then stop starting iterations; iterations
    /// already in flight get `graceful_stop_secs` to finish before their VU
    /// tasks are aborted and their observations discarded.
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;
        let thresholds = self.config.parsed_thresholds()?;
        let settings = &self.config.settings;

        let start_delay = settings.start_delay();
        if !start_delay.is_zero() {
            tracing::info!("Delaying start by {}s", start_delay.as_secs());
            tokio::time::sleep(start_delay).await;
        }

        let vu_count = settings.virtual_users;
        let run_cancel = CancellationToken::new();
        let stop = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active_vus = ActiveVuCounter::new();
        let limit = settings.iterations.map(IterationLimit::new);

        // Metrics channels
        let buffer_size = (vu_count as usize) * 100;
        let (obs_tx, obs_rx) = mpsc::channel::<Vec<Observation>>(buffer_size);
        let (display_tx, display_rx) = watch::channel(DisplayState {
            snapshot: MetricsSnapshot::default(),
            phase: None,
        });
        let phase = Arc::new(Mutex::new(None::<String>));

        tracing::info!(
            flow = self.flow.name(),
            target = self.config.target.url(),
            vus = vu_count,
            duration_secs = settings.duration_secs,
            "Starting load test"
        );

        let test_start = Instant::now();
        let vu_handles: Vec<_> = (1..=vu_count)
            .map(|vu| {
                tracker
                    .spawn(vu_loop(
                        vu,
                        self.flow.clone(),
                        ChannelSink::new(obs_tx.clone()),
                        run_cancel.clone(),
                        limit.clone(),
                        active_vus.clone(),
                    ))
                    .abort_handle()
            })
            .collect();

        // Drop original sender -- VUs hold their own clones
        drop(obs_tx);

        // Spawn metrics aggregator (NOT on tracker -- must outlive VU tasks)
        let aggregator_handle =
            tokio::spawn(metrics_aggregator(obs_rx, display_tx, stop.clone(), phase.clone()));

        let display_handle = self.live_display.then(|| {
            tokio::spawn(display_loop(
                display_rx.clone(),
                active_vus.clone(),
                vu_count,
                stop.clone(),
                self.no_color,
                test_start,
            ))
        });

        let ctrl_c_handle = tokio::spawn(handle_ctrl_c(run_cancel.clone()));

        // Run controller -- first-limit-wins between duration, iteration limit, Ctrl+C
        tokio::select! {
            _ = tokio::time::sleep(settings.duration()) => {
                run_cancel.cancel();
            }
            _ = run_cancel.cancelled() => {
                // Iteration limit or Ctrl+C
            }
        }

        // Graceful stop: let in-flight iterations finish
        *phase.lock() = Some(GRACEFUL_STOP_LABEL.to_string());
        tracker.close();
        let drained = tokio::time::timeout(settings.graceful_stop(), tracker.wait())
            .await
            .is_ok();
        let final_active_vus = active_vus.get();
        if !drained {
            tracing::warn!(
                "Graceful stop of {}s elapsed with {} VUs still running; interrupting",
                settings.graceful_stop_secs,
                final_active_vus
            );
            // Unfinished iterations never flushed their batch, so aborting
            // them drops their observations as a whole.
            for handle in &vu_handles {
                handle.abort();
            }
            tracker.wait().await;
        }

        // Ends the aggregator if VUs still hold senders, then the display
        stop.cancel();
        let snapshot = match aggregator_handle.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::error!("Metrics aggregator failed: {e}");
                display_rx.borrow().snapshot.clone()
            },
        };
        if let Some(handle) = display_handle {
            let _ = handle.await;
        }
        ctrl_c_handle.abort();

        let elapsed = test_start.elapsed();
        let thresholds = evaluate_thresholds(&thresholds, &snapshot);
        tracing::info!(
            iterations = snapshot.iterations(),
            elapsed_ms = elapsed.as_millis() as u64,
            thresholds_passed = all_passed(&thresholds),
            "Load test finished"
        );

        Ok(LoadTestResult {
            flow: self.flow.name().to_string(),
            snapshot,
            elapsed,
            final_active_vus,
            interrupted: !drained,
            thresholds,
        })
    }
}

/// Result of a completed load test run.
#[derive(Debug)]
pub struct LoadTestResult {
    /// Scenario name of the flow that ran.
    pub flow: String,
    /// Final metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Total elapsed time of the test.
    pub elapsed: Duration,
    /// Number of VUs that were still active when the graceful stop ended.
    pub final_active_vus: u32,
    /// Whether in-flight iterations were cut off by the graceful stop timeout.
    pub interrupted: bool,
    /// Threshold verdicts, sorted by metric selector.
    pub thresholds: Vec<ThresholdResult>,
}

impl LoadTestResult {
    /// Returns `true` when every threshold passed (or none were declared).
    pub fn thresholds_passed(&self) -> bool {
        all_passed(&self.thresholds)
    }
}

/// Metrics aggregator task.
///
/// Consumes per-iteration [`Observation`] batches from the mpsc channel, records them into a
/// single-owner [`MetricsRecorder`], and publishes [`DisplayState`] via the
/// watch channel every 2 seconds. Returns the final snapshot once every sender
/// is dropped or `stop` fires.
///
/// Uses `biased;` select to ensure the tick branch is checked first,
/// preventing display starvation when the mpsc channel is busy.
async fn metrics_aggregator(
    mut obs_rx: mpsc::Receiver<Vec<Observation>>,
    display_tx: watch::Sender<DisplayState>,
    stop: CancellationToken,
    phase: Arc<Mutex<Option<String>>>,
) -> MetricsSnapshot {
    let mut recorder = MetricsRecorder::new();
    let mut tick = tokio::time::interval(Duration::from_secs(2));
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                // Drain all available observations before publishing snapshot
                while let Ok(batch) = obs_rx.try_recv() {
                    record_batch(&mut recorder, &batch);
                }
                let _ = display_tx.send(DisplayState {
                    snapshot: recorder.snapshot(),
                    phase: phase.lock().clone(),
                });
            }
            result = obs_rx.recv() => {
                match result {
                    Some(batch) => record_batch(&mut recorder, &batch),
                    None => break,
                }
            }
            _ = stop.cancelled() => {
                while let Ok(batch) = obs_rx.try_recv() {
                    record_batch(&mut recorder, &batch);
                }
                break;
            }
        }
    }

    let snapshot = recorder.snapshot();
    tracing::debug!(
        observations = recorder.observation_count(),
        "Metrics aggregator finished"
    );
    let _ = display_tx.send(DisplayState {
        snapshot: snapshot.clone(),
        phase: phase.lock().clone(),
    });
    snapshot
}

fn record_batch(recorder: &mut MetricsRecorder, batch: &[Observation]) {
    for observation in batch {
        recorder.record(observation);
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to install Ctrl+C handler: {e}");
        return;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    // Second Ctrl+C: hard abort
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
