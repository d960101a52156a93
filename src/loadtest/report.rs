//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report file containing every metric
//! series, the threshold verdicts and the full resolved config for
//! reproducibility. Designed for CI/CD pipeline consumption.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::loadtest::config::{FlowKind, LoadTestConfig};
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::metrics::{MetricsSnapshot, RateSnapshot, TrendSnapshot};
use crate::loadtest::thresholds::ThresholdResult;

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// ISO-8601 timestamp when the report was generated.
    pub timestamp: String,
    /// Scenario name of the flow that ran.
    pub flow: String,
    /// Base URL or endpoint that was tested.
    pub target_url: String,
    /// Actual test duration in seconds.
    pub duration_secs: f64,
    /// Whether in-flight iterations were cut off at the end of the run.
    pub interrupted: bool,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: LoadTestConfig,
    /// Every metric series, keyed by selector (`name` or `name{key:value}`).
    pub metrics: ReportMetrics,
    /// Threshold verdicts, sorted by metric selector.
    pub thresholds: Vec<ThresholdResult>,
    /// `true` when no threshold failed.
    pub thresholds_passed: bool,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportMetrics {
    pub trends: BTreeMap<String, TrendReport>,
    pub rates: BTreeMap<String, RateReport>,
    pub counters: BTreeMap<String, CounterReport>,
}

/// Distribution summary in milliseconds.
#[derive(Debug, Serialize, PartialEq)]
pub struct TrendReport {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub med: f64,
    pub max: f64,
    #[serde(rename = "p(90)")]
    pub p90: f64,
    #[serde(rename = "p(95)")]
    pub p95: f64,
    #[serde(rename = "p(99)")]
    pub p99: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct RateReport {
    pub rate: f64,
    pub passes: u64,
    pub fails: u64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct CounterReport {
    pub count: u64,
    /// Increments per second of elapsed run time.
    pub rate: f64,
}

impl From<&TrendSnapshot> for TrendReport {
    fn from(trend: &TrendSnapshot) -> Self {
        Self {
            count: trend.count,
            avg: trend.avg,
            min: trend.min,
            med: trend.med,
            max: trend.max,
            p90: trend.p90,
            p95: trend.p95,
            p99: trend.p99,
        }
    }
}

impl From<&RateSnapshot> for RateReport {
    fn from(rate: &RateSnapshot) -> Self {
        Self {
            rate: rate.rate(),
            passes: rate.passes,
            fails: rate.fails,
        }
    }
}

impl ReportMetrics {
    fn from_snapshot(snap: &MetricsSnapshot, elapsed_secs: f64) -> Self {
        Self {
            trends: snap
                .trends
                .iter()
                .map(|(key, trend)| (key.to_string(), TrendReport::from(trend)))
                .collect(),
            rates: snap
                .rates
                .iter()
                .map(|(key, rate)| (key.to_string(), RateReport::from(rate)))
                .collect(),
            counters: snap
                .counters
                .iter()
                .map(|(key, count)| {
                    let rate = if elapsed_secs > 0.0 {
                        *count as f64 / elapsed_secs
                    } else {
                        0.0
                    };
                    (key.to_string(), CounterReport { count: *count, rate })
                })
                .collect(),
        }
    }
}

impl LoadTestReport {
    /// Build a report from load test results and the resolved config.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig) -> Self {
        let elapsed_secs = result.elapsed.as_secs_f64();

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            flow: result.flow.clone(),
            target_url: config.target.url().to_string(),
            duration_secs: elapsed_secs,
            interrupted: result.interrupted,
            config: config.clone(),
            metrics: ReportMetrics::from_snapshot(&result.snapshot, elapsed_secs),
            thresholds: result.thresholds.clone(),
            thresholds_passed: result.thresholds_passed(),
        }
    }
}

/// Write a JSON report file to the `.synthload/reports/` directory.
///
/// Creates the reports directory if it does not exist. The filename
/// is timestamped: `loadtest-<flow>-YYYY-MM-DDTHH-MM-SS.json` (hyphens, not
/// colons, for Windows compatibility).
///
/// Returns the path to the written report file.
pub fn write_report(
    report: &LoadTestReport,
    base_dir: &Path,
) -> Result<PathBuf, std::io::Error> {
    let reports_dir = base_dir.join(".synthload").join("reports");

    // Auto-create reports directory
    if !reports_dir.exists() {
        std::fs::create_dir_all(&reports_dir)?;
    }

    let filename = report_filename(report.config.flow_kind(), &chrono::Utc::now());
    let report_path = reports_dir.join(&filename);

    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    Ok(report_path)
}

/// Generate the report filename for a given flow and timestamp.
pub fn report_filename(flow: FlowKind, timestamp: &chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "loadtest-{flow}-{}.json",
        timestamp.format("%Y-%m-%dT%H-%M-%S")
    )
}
