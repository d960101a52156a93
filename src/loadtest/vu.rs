//! Virtual user (VU) task loop for load test execution.
//!
//! Each VU repeatedly runs one [`IterationFlow`] with a fresh
//! [`IterationContext`] until the run is cancelled or the shared iteration
//! limit is reached. Flows report through the [`MetricSink`] they are handed;
//! the loop adds the `iterations` and `iteration_duration` built-ins.

use crate::loadtest::context::{IterationContext, IterationResult};
use crate::loadtest::metrics::{MemorySink, MetricSink, Observation, ITERATIONS, ITERATION_DURATION};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// One test flow, invoked once per iteration by the scheduler.
///
/// Implementations must resolve every iteration to an [`IterationResult`]:
/// transport and protocol failures are recorded as failed outcomes, never
/// propagated.
#[async_trait]
pub trait IterationFlow: Send + Sync {
    /// Scenario name used in logs and the summary header.
    fn name(&self) -> &str;

    /// Runs one complete iteration, pushing observations into `sink`.
    async fn run_iteration(&self, ctx: &IterationContext, sink: &dyn MetricSink) -> IterationResult;
}

/// Atomic counter tracking the number of currently active virtual users.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across VU tasks and the engine orchestrator.
#[derive(Clone)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    /// Increments the active VU count by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared iteration budget across all VUs (first-limit-wins with duration).
#[derive(Clone)]
pub struct IterationLimit {
    counter: Arc<AtomicU64>,
    max: u64,
}

impl IterationLimit {
    /// Allows at most `max` iterations in total.
    pub fn new(max: u64) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(0)),
            max,
        }
    }

    /// Claims one iteration. Returns `false` once the budget is exhausted.
    pub fn try_claim(&self) -> bool {
        self.counter.fetch_add(1, Ordering::Relaxed) < self.max
    }
}

/// Runs a single iteration with start/end diagnostics.
///
/// The flow records into a per-iteration staging buffer that reaches `sink`
/// as one batch once the iteration has finished.
pub async fn run_one(
    flow: &dyn IterationFlow,
    ctx: &IterationContext,
    sink: &dyn MetricSink,
) -> IterationResult {
    tracing::debug!("Starting {}", ctx.scenario);
    let started = Instant::now();
    let staged = MemorySink::new();
    let result = flow.run_iteration(ctx, &staged).await;

    let mut batch = staged.take();
    batch.push(Observation::increment(ITERATIONS, 1));
    batch.push(Observation::duration(ITERATION_DURATION, started.elapsed()));
    sink.record_batch(batch).await;

    tracing::debug!(success = result.success, "Finished {}", ctx.scenario);
    result
}

/// Main virtual user task loop.
///
/// Each VU:
/// 1. Builds an [`IterationContext`] for its next iteration.
/// 2. Runs the flow inside an `iteration` tracing span.
/// 3. Stops when the cancellation token fires or the iteration limit is hit,
///    cancelling the run in the latter case.
///
/// Cancellation is checked between iterations only: an iteration that has
/// started always completes and records its verdict.
///
/// The `active_vus` counter is incremented on entry and decremented on exit.
pub async fn vu_loop<S>(
    vu_id: u32,
    flow: Arc<dyn IterationFlow>,
    sink: S,
    cancel: CancellationToken,
    limit: Option<IterationLimit>,
    active_vus: ActiveVuCounter,
) where
    S: MetricSink + 'static,
{
    active_vus.increment();
    let scenario: Arc<str> = Arc::from(flow.name());
    let mut iteration: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if let Some(ref limit) = limit {
            if !limit.try_claim() {
                cancel.cancel();
                break;
            }
        }

        let ctx = IterationContext::new(vu_id, iteration, scenario.clone());
        let span = tracing::debug_span!(
            "iteration",
            scenario = %ctx.scenario,
            vu = ctx.vu,
            iteration = ctx.iteration
        );
        run_one(flow.as_ref(), &ctx, &sink).instrument(span).await;
        iteration += 1;
    }

    active_vus.decrement();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::MetricKey;
    use std::time::Duration;

    struct CountingFlow;

    #[async_trait]
    impl IterationFlow for CountingFlow {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run_iteration(
            &self,
            ctx: &IterationContext,
            sink: &dyn MetricSink,
        ) -> IterationResult {
            sink.record(Observation::outcome("counting_ok", ctx.iteration % 2 == 0))
                .await;
            tokio::task::yield_now().await;
            IterationResult::passed(Duration::from_millis(1))
        }
    }

    #[test]
    fn test_active_vu_counter_increment_decrement() {
        let counter = ActiveVuCounter::new();
        assert_eq!(counter.get(), 0);

        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.get(), 3);

        counter.decrement();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn test_iteration_limit_claims() {
        let limit = IterationLimit::new(2);
        assert!(limit.try_claim());
        assert!(limit.clone().try_claim());
        assert!(!limit.try_claim());
    }

    #[tokio::test]
    async fn test_run_one_records_builtins() {
        let sink = MemorySink::new();
        let ctx = IterationContext::new(1, 0, Arc::from("counting"));
        let result = run_one(&CountingFlow, &ctx, &sink).await;

        assert!(result.success);
        assert_eq!(sink.counter(&MetricKey::new(ITERATIONS)), 1);
        assert_eq!(sink.samples(&MetricKey::new(ITERATION_DURATION)).len(), 1);
        assert_eq!(sink.outcomes(&MetricKey::new("counting_ok")), vec![true]);
    }

    #[tokio::test]
    async fn test_run_one_flushes_only_when_finished() {
        struct StallingFlow;

        #[async_trait]
        impl IterationFlow for StallingFlow {
            fn name(&self) -> &str {
                "stalling"
            }

            async fn run_iteration(
                &self,
                _ctx: &IterationContext,
                sink: &dyn MetricSink,
            ) -> IterationResult {
                sink.record(Observation::increment("started", 1)).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
                IterationResult::passed(Duration::from_secs(30))
            }
        }

        let sink = MemorySink::new();
        let ctx = IterationContext::new(1, 0, Arc::from("stalling"));
        let cut_off =
            tokio::time::timeout(Duration::from_millis(50), run_one(&StallingFlow, &ctx, &sink))
                .await;

        assert!(cut_off.is_err());
        assert!(sink.observations().is_empty());
    }

    #[tokio::test]
    async fn test_vu_loop_stops_at_iteration_limit() {
        let sink = MemorySink::new();
        let cancel = CancellationToken::new();
        let active = ActiveVuCounter::new();

        vu_loop(
            1,
            Arc::new(CountingFlow),
            sink.clone(),
            cancel.clone(),
            Some(IterationLimit::new(5)),
            active.clone(),
        )
        .await;

        assert!(cancel.is_cancelled(), "Limit should cancel the run");
        assert_eq!(active.get(), 0);
        assert_eq!(sink.counter(&MetricKey::new(ITERATIONS)), 5);
        assert_eq!(
            sink.outcomes(&MetricKey::new("counting_ok")),
            vec![true, false, true, false, true]
        );
    }

    #[tokio::test]
    async fn test_vu_loop_respects_cancellation() {
        let sink = MemorySink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        vu_loop(
            1,
            Arc::new(CountingFlow),
            sink.clone(),
            cancel,
            None,
            ActiveVuCounter::new(),
        )
        .await;

        assert!(sink.observations().is_empty());
    }
}
