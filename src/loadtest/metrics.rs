//! Metric observations, sinks, and the HdrHistogram-based aggregator.
//!
//! Flows push [`Observation`] values into a [`MetricSink`]. The engine uses a
//! [`ChannelSink`] feeding a single [`MetricsRecorder`] owned by the aggregator
//! task; tests and embedders can use [`MemorySink`] instead.
//!
//! # Design
//!
//! - **Three kinds**: distribution samples (trends), boolean outcomes (rates)
//!   and counter increments, matching k6's `Trend`, `Rate` and `Counter`.
//! - **Append-only**: observations are never mutated once recorded, so
//!   concurrent iterations only ever contend on the channel or the sink lock.
//! - **Tagged series**: an observation tagged `name{key:value}` is tracked as
//!   its own series and also rolled into the untagged `name` series.
//! - **Microsecond resolution** inside the histograms, reported as milliseconds.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Per-request latency, tagged by request label (`name`).
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Outcome of every individual assertion, tagged by check name (`check`).
pub const CHECKS: &str = "checks";
/// Number of completed iterations.
pub const ITERATIONS: &str = "iterations";
/// Wall-clock duration of each iteration.
pub const ITERATION_DURATION: &str = "iteration_duration";

/// A `key:value` tag attached to an observation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Tag key, e.g. `name`.
    pub key: String,
    /// Tag value, e.g. `GetUser`.
    pub value: String,
}

/// Identifies one metric series: a metric name plus an optional tag.
///
/// The [`fmt::Display`] impl produces the k6 selector form, e.g.
/// `http_req_duration{name:GetUser}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricKey {
    /// Metric name.
    pub name: String,
    /// Optional tag narrowing the series.
    pub tag: Option<Tag>,
}

impl MetricKey {
    /// Untagged key for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
        }
    }

    /// Key for `name` narrowed by `key:value`.
    pub fn tagged(name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: Some(Tag {
                key: key.into(),
                value: value.into(),
            }),
        }
    }

    /// The untagged parent series of this key.
    pub fn untagged(&self) -> Self {
        Self::new(self.name.clone())
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}{{{}:{}}}", self.name, tag.key, tag.value),
            None => f.write_str(&self.name),
        }
    }
}

/// Kind of metric a series belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Distribution of numeric samples.
    Trend,
    /// Fraction of boolean outcomes that were `true`.
    Rate,
    /// Monotonic sum of increments.
    Counter,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trend => "trend",
            Self::Rate => "rate",
            Self::Counter => "counter",
        };
        f.write_str(s)
    }
}

/// The value carried by an [`Observation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservationValue {
    /// A distribution sample (milliseconds for durations).
    Sample(f64),
    /// A boolean outcome.
    Outcome(bool),
    /// A counter increment.
    Increment(u64),
}

impl ObservationValue {
    /// The metric kind this value feeds.
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Sample(_) => MetricKind::Trend,
            Self::Outcome(_) => MetricKind::Rate,
            Self::Increment(_) => MetricKind::Counter,
        }
    }
}

/// A single write-once metric observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// The series this observation belongs to.
    pub key: MetricKey,
    /// The observed value.
    pub value: ObservationValue,
    /// When the observation was taken.
    pub timestamp: Instant,
}

impl Observation {
    /// A distribution sample for `name`.
    pub fn sample(name: &str, value: f64) -> Self {
        Self::new(MetricKey::new(name), ObservationValue::Sample(value))
    }

    /// A duration sample for `name`, recorded in milliseconds.
    pub fn duration(name: &str, duration: Duration) -> Self {
        Self::sample(name, duration_ms(duration))
    }

    /// A boolean outcome for `name`.
    pub fn outcome(name: &str, passed: bool) -> Self {
        Self::new(MetricKey::new(name), ObservationValue::Outcome(passed))
    }

    /// A counter increment for `name`.
    pub fn increment(name: &str, by: u64) -> Self {
        Self::new(MetricKey::new(name), ObservationValue::Increment(by))
    }

    /// Narrows this observation to the `key:value` tagged series.
    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.key = MetricKey::tagged(self.key.name, key, value);
        self
    }

    fn new(key: MetricKey, value: ObservationValue) -> Self {
        Self {
            key,
            value,
            timestamp: Instant::now(),
        }
    }
}

/// Converts a duration to fractional milliseconds.
pub fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Destination for observations produced by test flows.
///
/// Implementations must accept concurrent appends from many iterations
/// without losing updates.
#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Appends one observation.
    async fn record(&self, observation: Observation);

    /// Appends every observation of one finished iteration.
    ///
    /// The engine's sink delivers a batch as a unit, so an iteration that is
    /// cut off before its batch is flushed leaves no trace in the results.
    async fn record_batch(&self, batch: Vec<Observation>) {
        for observation in batch {
            self.record(observation).await;
        }
    }
}

/// Sink that forwards observation batches to the engine's aggregator over a
/// bounded channel. One channel message is one batch.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Vec<Observation>>,
}

impl ChannelSink {
    /// Wraps the sending half of the aggregator channel.
    pub fn new(tx: mpsc::Sender<Vec<Observation>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MetricSink for ChannelSink {
    async fn record(&self, observation: Observation) {
        self.record_batch(vec![observation]).await;
    }

    async fn record_batch(&self, batch: Vec<Observation>) {
        if batch.is_empty() {
            return;
        }
        // Receiver dropped means the run is over; late observations are discarded.
        let _ = self.tx.send(batch).await;
    }
}

/// In-memory sink that keeps every observation, in arrival order.
#[derive(Clone, Default)]
pub struct MemorySink {
    observations: Arc<Mutex<Vec<Observation>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything recorded so far.
    pub fn observations(&self) -> Vec<Observation> {
        self.observations.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Observation> {
        std::mem::take(&mut *self.observations.lock())
    }

    /// Distribution samples recorded for exactly `key`.
    pub fn samples(&self, key: &MetricKey) -> Vec<f64> {
        self.observations
            .lock()
            .iter()
            .filter(|o| &o.key == key)
            .filter_map(|o| match o.value {
                ObservationValue::Sample(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Boolean outcomes recorded for exactly `key`.
    pub fn outcomes(&self, key: &MetricKey) -> Vec<bool> {
        self.observations
            .lock()
            .iter()
            .filter(|o| &o.key == key)
            .filter_map(|o| match o.value {
                ObservationValue::Outcome(v) => Some(v),
                _ => None,
            })
            .collect()
    }

    /// Sum of counter increments recorded for exactly `key`.
    pub fn counter(&self, key: &MetricKey) -> u64 {
        self.observations
            .lock()
            .iter()
            .filter(|o| &o.key == key)
            .map(|o| match o.value {
                ObservationValue::Increment(v) => v,
                _ => 0,
            })
            .sum()
    }

    /// Aggregates everything recorded so far into a snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut recorder = MetricsRecorder::new();
        for observation in self.observations.lock().iter() {
            recorder.record(observation);
        }
        recorder.snapshot()
    }
}

#[async_trait]
impl MetricSink for MemorySink {
    async fn record(&self, observation: Observation) {
        self.observations.lock().push(observation);
    }

    async fn record_batch(&self, batch: Vec<Observation>) {
        self.observations.lock().extend(batch);
    }
}

/// Creates an auto-resizing histogram with 3 significant figures.
fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

/// Accumulated distribution for one trend series.
struct TrendSeries {
    /// Samples in microseconds.
    histogram: Histogram<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl TrendSeries {
    fn new() -> Self {
        Self {
            histogram: new_histogram(),
            count: 0,
            sum: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    fn record(&mut self, value: f64) {
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        let _ = self.histogram.record((value * 1000.0).round() as u64);
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn snapshot(&self) -> TrendSnapshot {
        TrendSnapshot::from_parts(self.histogram.clone(), self.count, self.sum, self.min, self.max)
    }
}

impl Default for TrendSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of a trend series. All values are in milliseconds.
#[derive(Clone)]
pub struct TrendSnapshot {
    /// Number of samples.
    pub count: u64,
    /// Smallest sample.
    pub min: f64,
    /// Largest sample.
    pub max: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// Median.
    pub med: f64,
    /// 90th percentile.
    pub p90: f64,
    /// 95th percentile.
    pub p95: f64,
    /// 99th percentile.
    pub p99: f64,
    histogram: Histogram<u64>,
}

impl TrendSnapshot {
    /// Builds a snapshot from raw samples (milliseconds).
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut series = TrendSeries::new();
        for &sample in samples {
            series.record(sample);
        }
        series.snapshot()
    }

    fn from_parts(histogram: Histogram<u64>, count: u64, sum: f64, min: f64, max: f64) -> Self {
        if count == 0 {
            return Self {
                count: 0,
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                med: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                histogram,
            };
        }
        let quantile = |q: f64| histogram.value_at_quantile(q) as f64 / 1000.0;
        Self {
            count,
            min,
            max,
            avg: sum / count as f64,
            med: quantile(0.50),
            p90: quantile(0.90),
            p95: quantile(0.95),
            p99: quantile(0.99),
            histogram,
        }
    }

    /// Arbitrary percentile (`0.0..=100.0`) in milliseconds. Returns 0 when empty.
    pub fn percentile(&self, percentile: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let q = (percentile / 100.0).clamp(0.0, 1.0);
        self.histogram.value_at_quantile(q) as f64 / 1000.0
    }
}

impl fmt::Debug for TrendSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrendSnapshot")
            .field("count", &self.count)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("avg", &self.avg)
            .field("med", &self.med)
            .field("p90", &self.p90)
            .field("p95", &self.p95)
            .field("p99", &self.p99)
            .finish()
    }
}

/// Point-in-time view of a rate series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateSnapshot {
    /// Number of `true` outcomes.
    pub passes: u64,
    /// Number of `false` outcomes.
    pub fails: u64,
}

impl RateSnapshot {
    /// Total outcomes recorded.
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    /// Fraction of `true` outcomes (0.0..=1.0). Returns 0.0 when empty.
    pub fn rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.passes as f64 / total as f64
    }
}

/// Point-in-time snapshot of every series seen by a [`MetricsRecorder`].
///
/// Series are kept in ordered maps so terminal and JSON output is deterministic.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Distribution series.
    pub trends: BTreeMap<MetricKey, TrendSnapshot>,
    /// Rate series.
    pub rates: BTreeMap<MetricKey, RateSnapshot>,
    /// Counter series.
    pub counters: BTreeMap<MetricKey, u64>,
}

impl MetricsSnapshot {
    /// Trend series for `key`, if any samples were recorded.
    pub fn trend(&self, key: &MetricKey) -> Option<&TrendSnapshot> {
        self.trends.get(key)
    }

    /// Rate series for `key`, if any outcomes were recorded.
    pub fn rate(&self, key: &MetricKey) -> Option<&RateSnapshot> {
        self.rates.get(key)
    }

    /// Counter value for `key`, if any increments were recorded.
    pub fn counter(&self, key: &MetricKey) -> Option<u64> {
        self.counters.get(key).copied()
    }

    /// Number of completed iterations (the `iterations` counter).
    pub fn iterations(&self) -> u64 {
        self.counter(&MetricKey::new(ITERATIONS)).unwrap_or(0)
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.trends.is_empty() && self.rates.is_empty() && self.counters.is_empty()
    }
}

/// Single-owner aggregator for [`Observation`] values.
///
/// No internal locking: the engine feeds it from one task through an mpsc
/// channel.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use synthload::loadtest::metrics::{MetricKey, MetricsRecorder, Observation};
///
/// let mut recorder = MetricsRecorder::new();
/// recorder.record(&Observation::duration("rest_request_duration", Duration::from_millis(42)));
/// recorder.record(&Observation::outcome("rest_success_rate", true));
///
/// let snap = recorder.snapshot();
/// assert_eq!(snap.trend(&MetricKey::new("rest_request_duration")).unwrap().count, 1);
/// assert_eq!(snap.rate(&MetricKey::new("rest_success_rate")).unwrap().rate(), 1.0);
/// ```
#[derive(Default)]
pub struct MetricsRecorder {
    trends: BTreeMap<MetricKey, TrendSeries>,
    rates: BTreeMap<MetricKey, RateSnapshot>,
    counters: BTreeMap<MetricKey, u64>,
    observations: u64,
}

impl MetricsRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation into its series (and the untagged parent series).
    pub fn record(&mut self, observation: &Observation) {
        self.observations += 1;
        let parent = observation.key.tag.as_ref().map(|_| observation.key.untagged());
        let keys = std::iter::once(&observation.key).chain(parent.as_ref());

        for key in keys {
            match observation.value {
                ObservationValue::Sample(value) => {
                    self.trends.entry(key.clone()).or_default().record(value);
                },
                ObservationValue::Outcome(passed) => {
                    let rate = self.rates.entry(key.clone()).or_default();
                    if passed {
                        rate.passes += 1;
                    } else {
                        rate.fails += 1;
                    }
                },
                ObservationValue::Increment(by) => {
                    *self.counters.entry(key.clone()).or_insert(0) += by;
                },
            }
        }
    }

    /// Number of observations recorded (tag roll-ups are not double counted).
    pub fn observation_count(&self) -> u64 {
        self.observations
    }

    /// Capture a point-in-time snapshot of all series.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            trends: self
                .trends
                .iter()
                .map(|(key, series)| (key.clone(), series.snapshot()))
                .collect(),
            rates: self.rates.clone(),
            counters: self.counters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_recorder_is_empty() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.observation_count(), 0);
        assert!(recorder.snapshot().is_empty());
    }

    #[test]
    fn test_metric_key_display() {
        assert_eq!(MetricKey::new("checks").to_string(), "checks");
        assert_eq!(
            MetricKey::tagged(HTTP_REQ_DURATION, "name", "GetUser").to_string(),
            "http_req_duration{name:GetUser}"
        );
    }

    #[test]
    fn test_trend_statistics() {
        let mut recorder = MetricsRecorder::new();
        for ms in [10.0, 20.0, 30.0, 40.0] {
            recorder.record(&Observation::sample("latency", ms));
        }
        let snap = recorder.snapshot();
        let trend = snap.trend(&MetricKey::new("latency")).unwrap();
        assert_eq!(trend.count, 4);
        assert_eq!(trend.min, 10.0);
        assert_eq!(trend.max, 40.0);
        assert!((trend.avg - 25.0).abs() < f64::EPSILON);
        assert!((trend.med - 20.0).abs() < 0.1, "med was {}", trend.med);
        assert!((trend.p99 - 40.0).abs() < 0.1, "p99 was {}", trend.p99);
    }

    #[test]
    fn test_percentile_arbitrary() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        let trend = TrendSnapshot::from_samples(&samples);
        assert!((trend.percentile(50.0) - 50.0).abs() < 0.1);
        assert!((trend.percentile(95.0) - 95.0).abs() < 0.1);
        assert!((trend.percentile(100.0) - 100.0).abs() < 0.1);
    }

    #[test]
    fn test_empty_trend_snapshot_is_zeroed() {
        let trend = TrendSnapshot::from_samples(&[]);
        assert_eq!(trend.count, 0);
        assert_eq!(trend.min, 0.0);
        assert_eq!(trend.percentile(95.0), 0.0);
    }

    #[test]
    fn test_rate_counts() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Observation::outcome("ok", true));
        recorder.record(&Observation::outcome("ok", true));
        recorder.record(&Observation::outcome("ok", false));
        recorder.record(&Observation::outcome("ok", true));
        let rate = *recorder.snapshot().rate(&MetricKey::new("ok")).unwrap();
        assert_eq!(rate, RateSnapshot { passes: 3, fails: 1 });
        assert!((rate.rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rate_is_zero() {
        assert_eq!(RateSnapshot::default().rate(), 0.0);
    }

    #[test]
    fn test_counter_sums_increments() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Observation::increment("rest_total_requests", 3));
        recorder.record(&Observation::increment("rest_total_requests", 3));
        let snap = recorder.snapshot();
        assert_eq!(snap.counter(&MetricKey::new("rest_total_requests")), Some(6));
        assert_eq!(snap.counter(&MetricKey::new("missing")), None);
    }

    #[test]
    fn test_tagged_observation_rolls_up() {
        let mut recorder = MetricsRecorder::new();
        recorder.record(&Observation::sample(HTTP_REQ_DURATION, 100.0).with_tag("name", "GetUser"));
        recorder.record(&Observation::sample(HTTP_REQ_DURATION, 300.0).with_tag("name", "GetPosts"));
        let snap = recorder.snapshot();

        let user = snap
            .trend(&MetricKey::tagged(HTTP_REQ_DURATION, "name", "GetUser"))
            .unwrap();
        assert_eq!(user.count, 1);
        let all = snap.trend(&MetricKey::new(HTTP_REQ_DURATION)).unwrap();
        assert_eq!(all.count, 2);
        assert_eq!(recorder.observation_count(), 2);
    }

    #[test]
    fn test_iterations_helper() {
        let mut recorder = MetricsRecorder::new();
        assert_eq!(recorder.snapshot().iterations(), 0);
        recorder.record(&Observation::increment(ITERATIONS, 1));
        recorder.record(&Observation::increment(ITERATIONS, 1));
        assert_eq!(recorder.snapshot().iterations(), 2);
    }

    #[test]
    fn test_negative_and_nan_samples_clamp_to_zero() {
        let trend = TrendSnapshot::from_samples(&[-5.0, f64::NAN]);
        assert_eq!(trend.count, 2);
        assert_eq!(trend.min, 0.0);
        assert_eq!(trend.max, 0.0);
    }

    #[test]
    fn test_duration_observation_in_ms() {
        let obs = Observation::duration("d", Duration::from_micros(1500));
        assert_eq!(obs.value, ObservationValue::Sample(1.5));
        assert_eq!(obs.value.kind(), MetricKind::Trend);
    }

    #[tokio::test]
    async fn test_memory_sink_queries() {
        let sink = MemorySink::new();
        sink.record(Observation::sample("t", 1.0)).await;
        sink.record(Observation::sample("t", 2.0).with_tag("name", "x")).await;
        sink.record(Observation::outcome("r", false)).await;
        sink.record(Observation::increment("c", 2)).await;
        sink.record(Observation::increment("c", 1)).await;

        assert_eq!(sink.samples(&MetricKey::new("t")), vec![1.0]);
        assert_eq!(sink.samples(&MetricKey::tagged("t", "name", "x")), vec![2.0]);
        assert_eq!(sink.outcomes(&MetricKey::new("r")), vec![false]);
        assert_eq!(sink.counter(&MetricKey::new("c")), 3);
        assert_eq!(sink.observations().len(), 5);
        assert_eq!(sink.snapshot().trend(&MetricKey::new("t")).unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_memory_sink_concurrent_appends() {
        let sink = MemorySink::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sink = sink.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    sink.record(Observation::increment("c", 1)).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(sink.counter(&MetricKey::new("c")), 800);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx);
        sink.record(Observation::outcome("r", true)).await;
        let received = rx.recv().await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].key, MetricKey::new("r"));
    }

    #[tokio::test]
    async fn test_channel_sink_sends_batch_as_one_message() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = ChannelSink::new(tx);
        sink.record_batch(vec![
            Observation::increment("c", 1),
            Observation::outcome("r", false),
        ])
        .await;
        sink.record_batch(Vec::new()).await;
        drop(sink);

        assert_eq!(rx.recv().await.unwrap().len(), 2);
        assert!(rx.recv().await.is_none(), "empty batches are not sent");
    }

    #[tokio::test]
    async fn test_memory_sink_take_drains() {
        let sink = MemorySink::new();
        sink.record_batch(vec![Observation::increment("c", 2), Observation::increment("c", 3)])
            .await;
        assert_eq!(sink.take().len(), 2);
        assert!(sink.observations().is_empty());
    }

    #[tokio::test]
    async fn test_channel_sink_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        ChannelSink::new(tx)
            .record(Observation::outcome("r", true))
            .await;
    }
}
