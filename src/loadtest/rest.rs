//! REST check pipeline.
//!
//! One iteration issues three GET requests in a fixed order (`GetUser`,
//! `GetPosts`, `GetComments`), evaluates every check of every step
//! independently, and then records the aggregate duration, the combined
//! status verdict and the request count. No step short-circuits another:
//! a failed or unreachable endpoint only turns its own checks red.

use crate::loadtest::context::{IterationContext, IterationResult};
use crate::loadtest::decode::{decode, DecodedPayload, Response};
use crate::loadtest::error::ProbeError;
use crate::loadtest::metrics::{MetricSink, Observation, CHECKS, HTTP_REQ_DURATION};
use crate::loadtest::vu::IterationFlow;

use async_trait::async_trait;
use std::time::{Duration, Instant};

/// Sum of the three request durations per iteration (ms).
pub const REST_REQUEST_DURATION: &str = "rest_request_duration";
/// Whether all three requests answered `200`.
pub const REST_SUCCESS_RATE: &str = "rest_success_rate";
/// Number of requests issued.
pub const REST_TOTAL_REQUESTS: &str = "rest_total_requests";

/// Default REST target.
pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com";

/// Structure-specific expectation for a step's decoded body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// A JSON object containing every listed field.
    Fields(&'static [&'static str]),
    /// A non-empty JSON array.
    NonEmptyArray,
}

/// One request of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestStep {
    /// Request label, used as the `name` tag of `http_req_duration`.
    pub label: &'static str,
    /// Resource noun used in check names (`user`, `posts`, ...).
    pub subject: &'static str,
    /// Path and query appended to the base URL.
    pub path: &'static str,
    /// What a healthy body looks like.
    pub expectation: Expectation,
}

/// The fixed request sequence. Filter keys are constants: steps do not
/// consume each other's payloads.
pub const REST_STEPS: [RestStep; 3] = [
    RestStep {
        label: "GetUser",
        subject: "user",
        path: "/users/1",
        expectation: Expectation::Fields(&["name", "email"]),
    },
    RestStep {
        label: "GetPosts",
        subject: "posts",
        path: "/posts?userId=1",
        expectation: Expectation::NonEmptyArray,
    },
    RestStep {
        label: "GetComments",
        subject: "comments",
        path: "/comments?postId=1",
        expectation: Expectation::NonEmptyArray,
    },
];

impl RestStep {
    /// Evaluates every check for this step. Each check is independent.
    pub fn checks(&self, status: Option<u16>, payload: &DecodedPayload) -> Vec<(String, bool)> {
        let mut checks = vec![
            (format!("{} status is 200", self.subject), status == Some(200)),
            (format!("{} response is JSON", self.subject), payload.is_decoded()),
        ];
        match self.expectation {
            Expectation::Fields(fields) => {
                for &field in fields {
                    checks.push((
                        format!("{} has {}", self.subject, field),
                        payload.has_fields(&[field]),
                    ));
                }
            },
            Expectation::NonEmptyArray => {
                checks.push((
                    format!("{} array not empty", self.subject),
                    payload.is_non_empty_array(),
                ));
            },
        }
        checks
    }
}

/// What happened to one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Request label.
    pub label: &'static str,
    /// Response status, `None` when the transport failed.
    pub status: Option<u16>,
    /// Measured request duration (time to failure for transport errors).
    pub timing: Duration,
    /// Check names with their verdicts.
    pub checks: Vec<(String, bool)>,
}

/// Issues GET requests on behalf of the pipeline.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetches `url`. `label` identifies the request in diagnostics.
    async fn get(&self, url: &str, label: &str) -> Result<Response, ProbeError>;
}

/// [`HttpTransport`] over a shared [`reqwest::Client`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Wraps `client`, applying `timeout` to every request.
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, label: &str) -> Result<Response, ProbeError> {
        let started = Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProbeError::classify_reqwest(&e))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ProbeError::classify_reqwest(&e))?;
        let timing = started.elapsed();

        tracing::trace!(label, status, elapsed_ms = timing.as_millis() as u64, "GET {url}");
        Ok(Response::new(status, body, timing))
    }
}

/// The REST check pipeline flow.
pub struct RestSuite<T> {
    transport: T,
    base_url: String,
}

impl<T: HttpTransport> RestSuite<T> {
    /// Creates a pipeline targeting `base_url`.
    pub fn new(transport: T, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into(),
        }
    }

    /// Absolute URL for `step`.
    pub fn step_url(&self, step: &RestStep) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), step.path)
    }

    /// Runs all three steps and records the iteration's aggregate metrics.
    ///
    /// Exactly one `rest_request_duration` sample and one `rest_success_rate`
    /// outcome are recorded, and `rest_total_requests` grows by 3, whatever
    /// happened to the individual requests.
    pub async fn run_rest_suite(&self, sink: &dyn MetricSink) -> IterationResult {
        let mut reports = Vec::with_capacity(REST_STEPS.len());
        for step in &REST_STEPS {
            reports.push(self.run_step(step, sink).await);
        }

        let total: Duration = reports.iter().map(|r| r.timing).sum();
        let success = reports.iter().all(|r| r.status == Some(200));

        sink.record(Observation::duration(REST_REQUEST_DURATION, total))
            .await;
        sink.record(Observation::outcome(REST_SUCCESS_RATE, success))
            .await;
        sink.record(Observation::increment(
            REST_TOTAL_REQUESTS,
            REST_STEPS.len() as u64,
        ))
        .await;

        IterationResult {
            success,
            duration: total,
        }
    }

    /// Executes one step, emitting its tagged latency sample and its checks.
    pub async fn run_step(&self, step: &RestStep, sink: &dyn MetricSink) -> StepReport {
        let url = self.step_url(step);
        let started = Instant::now();

        let (status, timing, payload) = match self.transport.get(&url, step.label).await {
            Ok(response) => {
                let payload = decode(&response);
                (Some(response.status), response.timing, payload)
            },
            Err(err) => {
                tracing::warn!(
                    label = step.label,
                    category = err.error_category(),
                    "Request failed: {err}"
                );
                (
                    None,
                    started.elapsed(),
                    DecodedPayload::DecodeFailed(err.to_string()),
                )
            },
        };

        sink.record(Observation::duration(HTTP_REQ_DURATION, timing).with_tag("name", step.label))
            .await;

        let checks = step.checks(status, &payload);
        for (name, passed) in &checks {
            if !passed {
                tracing::debug!(label = step.label, "Check failed: {name}");
            }
            sink.record(Observation::outcome(CHECKS, *passed).with_tag("check", name))
                .await;
        }

        StepReport {
            label: step.label,
            status,
            timing,
            checks,
        }
    }
}

#[async_trait]
impl<T: HttpTransport> IterationFlow for RestSuite<T> {
    fn name(&self) -> &str {
        "REST API Test Suite"
    }

    async fn run_iteration(&self, _ctx: &IterationContext, sink: &dyn MetricSink) -> IterationResult {
        self.run_rest_suite(sink).await
    }
}
