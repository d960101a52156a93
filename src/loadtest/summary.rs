//! k6-style terminal summary renderer for load test results.
//!
//! Produces a colorized, human-readable summary with:
//! - ASCII art header with test configuration
//! - Per-check pass/fail breakdown
//! - Dotted-line metric rows (metric.........: value), sorted by name
//! - Threshold verdicts
//!
//! The renderer is a pure function: [`render_summary`] takes structured data
//! and returns a formatted [`String`]. No I/O, no side effects -- easy to
//! unit test without terminal access.
//!
//! Color coding is applied via the `colored` crate, which respects
//! the global override set by [`colored::control::set_override(false)`]
//! when `--no-color` is active or stdout is piped.

use colored::Colorize;
use std::collections::BTreeMap;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;
use crate::loadtest::metrics::{MetricKey, MetricsSnapshot, RateSnapshot, TrendSnapshot, CHECKS};
use crate::loadtest::thresholds::ThresholdResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 40;

/// Render a k6-style terminal summary from load test results.
///
/// # Layout
///
/// ```text
///           /\      |  synthload
///          /  \     |
///     /\  /    \    |  flow:      REST API Test Suite
///    /  \/      \   |  target:    https://jsonplaceholder.typicode.com
///   /    \       \  |  vus:       10
///  /      \       \ |  duration:  10s
///
///   ✓ user status is 200
///   ✗ user has email
///     ↳  90% -- ✓ 36 / ✗ 4
///
///   checks..........................: 98.75%  ✓ 316  ✗ 4
/// ✓ http_req_duration...............: avg=120.31ms min=80.02ms med=110.59ms max=410.62ms p(90)=180.22ms p(95)=220.16ms
/// ✓   { name:GetUser }..............: avg=101.20ms min=80.02ms med=98.30ms max=240.12ms p(90)=150.01ms p(95)=170.11ms
///   iterations......................: 40  3.98/s
/// ✗ rest_success_rate...............: 90.00%  ✓ 36  ✗ 4
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig) -> String {
    let snap = &result.snapshot;
    let mut lines = Vec::new();

    lines.push(render_header(
        &result.flow,
        config.target.url(),
        config.settings.virtual_users,
        config.settings.duration_secs,
    ));

    let checks = render_checks(snap);
    if !checks.is_empty() {
        lines.extend(checks);
        lines.push(String::new());
    }

    let elapsed_secs = result.elapsed.as_secs_f64();
    for (key, value) in metric_rows(snap, &result.thresholds, elapsed_secs) {
        let marker = threshold_marker(&key, &result.thresholds);
        let label = match &key.tag {
            Some(tag) => format!("  {{ {}:{} }}", tag.key, tag.value),
            None => key.name.clone(),
        };
        lines.push(format!("{marker}{}", format_metric_row(&label, &value, PAD_WIDTH)));
    }
    lines.push(format!(
        "  {}",
        format_metric_row("vus", &config.settings.virtual_users.to_string(), PAD_WIDTH)
    ));

    if result.interrupted {
        lines.push(String::new());
        lines.push(format!(
            "  {} {} VUs were interrupted by the graceful stop timeout",
            "WARNING:".yellow().bold(),
            result.final_active_vus
        ));
    }

    if !result.thresholds.is_empty() {
        lines.push(String::new());
        lines.push("  thresholds:".to_string());
        for threshold in &result.thresholds {
            lines.push(render_threshold(threshold));
        }
    }

    lines.join("\n")
}

/// Render the ASCII art header with test configuration details.
fn render_header(flow: &str, url: &str, vus: u32, duration_secs: u64) -> String {
    format!(
        r#"
          /\      |  {}
         /  \     |
    /\  /    \    |  flow:      {}
   /  \/      \   |  target:    {}
  /    \       \  |  vus:       {}
 /      \       \ |  duration:  {}s
"#,
        "synthload".bold(),
        flow,
        url,
        vus,
        duration_secs,
    )
}

/// One line per named check, failing checks followed by their pass ratio.
fn render_checks(snap: &MetricsSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    for (key, rate) in &snap.rates {
        let Some(tag) = key.tag.as_ref().filter(|_| key.name == CHECKS) else {
            continue;
        };
        if rate.fails == 0 {
            lines.push(format!("  {} {}", "✓".green(), tag.value));
        } else {
            lines.push(format!("  {} {}", "✗".red(), tag.value));
            lines.push(format!(
                "    ↳  {:.0}% -- ✓ {} / ✗ {}",
                rate.rate() * 100.0,
                rate.passes,
                rate.fails
            ));
        }
    }
    lines
}

/// Rows for every untagged series plus tagged series referenced by a
/// threshold, ordered so tagged rows follow their parent.
fn metric_rows(
    snap: &MetricsSnapshot,
    thresholds: &[ThresholdResult],
    elapsed_secs: f64,
) -> BTreeMap<MetricKey, String> {
    let visible = |key: &MetricKey| {
        key.tag.is_none() || thresholds.iter().any(|t| t.metric == key.to_string())
    };

    let mut rows = BTreeMap::new();
    for (key, trend) in &snap.trends {
        if visible(key) {
            rows.insert(key.clone(), format_trend(trend));
        }
    }
    for (key, rate) in &snap.rates {
        if visible(key) {
            rows.insert(key.clone(), format_rate(rate));
        }
    }
    for (key, count) in &snap.counters {
        if visible(key) {
            rows.insert(key.clone(), format_counter(*count, elapsed_secs));
        }
    }
    rows
}

fn threshold_marker(key: &MetricKey, thresholds: &[ThresholdResult]) -> String {
    let selector = key.to_string();
    let mut matching = thresholds.iter().filter(|t| t.metric == selector).peekable();
    if matching.peek().is_none() {
        return "  ".to_string();
    }
    if matching.all(|t| t.passed) {
        format!("{} ", "✓".green())
    } else {
        format!("{} ", "✗".red())
    }
}

fn render_threshold(threshold: &ThresholdResult) -> String {
    let marker = if threshold.passed {
        "✓".green()
    } else {
        "✗".red()
    };
    let detail = match (&threshold.observed, &threshold.reason) {
        (_, Some(reason)) => reason.clone(),
        (Some(value), None) => format!("observed {value:.2}"),
        (None, None) => "no data".to_string(),
    };
    format!(
        "    {marker} {}: {} ({detail})",
        threshold.metric, threshold.expression
    )
}

fn format_ms(value: f64) -> String {
    format!("{value:.2}ms")
}

fn format_trend(trend: &TrendSnapshot) -> String {
    format!(
        "avg={} min={} med={} max={} p(90)={} p(95)={}",
        format_ms(trend.avg),
        format_ms(trend.min),
        format_ms(trend.med),
        format_ms(trend.max),
        format_ms(trend.p90),
        format_ms(trend.p95),
    )
}

fn format_rate(rate: &RateSnapshot) -> String {
    let pct = format!("{:.2}%", rate.rate() * 100.0);
    let pct = if rate.fails > 0 {
        pct.yellow().to_string()
    } else {
        pct.green().to_string()
    };
    format!("{pct}  ✓ {}  ✗ {}", rate.passes, rate.fails)
}

fn format_counter(count: u64, elapsed_secs: f64) -> String {
    let per_sec = if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    };
    format!("{count}  {per_sec:.2}/s")
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str, pad_width: usize) -> String {
    format!("  {name:.<pad_width$}: {value}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{MetricsRecorder, Observation, HTTP_REQ_DURATION, ITERATIONS};
    use crate::loadtest::rest::{REST_SUCCESS_RATE, REST_TOTAL_REQUESTS};
    use std::time::Duration;

    /// Disable colors in tests for deterministic assertions.
    fn setup_no_color() {
        colored::control::set_override(false);
    }

    fn result_with(observations: &[Observation], thresholds: Vec<ThresholdResult>) -> LoadTestResult {
        let mut recorder = MetricsRecorder::new();
        for observation in observations {
            recorder.record(observation);
        }
        LoadTestResult {
            flow: "REST API Test Suite".to_string(),
            snapshot: recorder.snapshot(),
            elapsed: Duration::from_secs(10),
            final_active_vus: 0,
            interrupted: false,
            thresholds,
        }
    }

    fn threshold(metric: &str, expression: &str, passed: bool) -> ThresholdResult {
        ThresholdResult {
            metric: metric.to_string(),
            expression: expression.to_string(),
            observed: Some(1.0),
            passed,
            reason: None,
        }
    }

    #[test]
    fn test_render_header_contains_config() {
        setup_no_color();
        let config = LoadTestConfig::rest_default();
        let output = render_summary(&result_with(&[], vec![]), &config);

        assert!(output.contains("synthload"));
        assert!(output.contains("REST API Test Suite"));
        assert!(output.contains("https://jsonplaceholder.typicode.com"));
        assert!(output.contains("vus:       10"));
        assert!(output.contains("duration:  10s"));
    }

    #[test]
    fn test_render_metric_rows_sorted_and_padded() {
        setup_no_color();
        let config = LoadTestConfig::rest_default();
        let output = render_summary(
            &result_with(
                &[
                    Observation::outcome(REST_SUCCESS_RATE, true),
                    Observation::increment(REST_TOTAL_REQUESTS, 30),
                    Observation::increment(ITERATIONS, 10),
                ],
                vec![],
            ),
            &config,
        );

        let iterations = output.find("iterations").unwrap();
        let success = output.find("rest_success_rate").unwrap();
        let total = output.find("rest_total_requests").unwrap();
        assert!(iterations < success && success < total, "{output}");
        assert!(output.contains("rest_total_requests....."), "{output}");
        assert!(output.contains(": 30  3.00/s"), "{output}");
        assert!(output.contains("100.00%  ✓ 1  ✗ 0"), "{output}");
    }

    #[test]
    fn test_render_checks_breakdown() {
        setup_no_color();
        let config = LoadTestConfig::rest_default();
        let output = render_summary(
            &result_with(
                &[
                    Observation::outcome(CHECKS, true).with_tag("check", "user status is 200"),
                    Observation::outcome(CHECKS, true).with_tag("check", "user has email"),
                    Observation::outcome(CHECKS, false).with_tag("check", "user has email"),
                ],
                vec![],
            ),
            &config,
        );

        assert!(output.contains("✓ user status is 200"), "{output}");
        assert!(output.contains("✗ user has email"), "{output}");
        assert!(output.contains("↳  50% -- ✓ 1 / ✗ 1"), "{output}");
        assert!(!output.contains("{ check:"), "check series are not listed as rows");
    }

    #[test]
    fn test_render_threshold_markers_and_tagged_rows() {
        setup_no_color();
        let config = LoadTestConfig::rest_default();
        let output = render_summary(
            &result_with(
                &[
                    Observation::sample(HTTP_REQ_DURATION, 100.0).with_tag("name", "GetUser"),
                    Observation::sample(HTTP_REQ_DURATION, 200.0).with_tag("name", "GetPosts"),
                    Observation::outcome(REST_SUCCESS_RATE, false),
                ],
                vec![
                    threshold("http_req_duration{name:GetUser}", "p(95)<800", true),
                    threshold(REST_SUCCESS_RATE, "rate>0.95", false),
                ],
            ),
            &config,
        );

        let user_row = output.lines().find(|l| l.contains("{ name:GetUser }")).unwrap();
        assert!(user_row.starts_with('✓'), "{user_row}");
        assert!(!output.contains("GetPosts"), "unthresholded tags stay hidden: {output}");
        let rate_row = output.lines().find(|l| l.contains("rest_success_rate...")).unwrap();
        assert!(rate_row.starts_with('✗'), "{rate_row}");
        assert!(output.contains("  thresholds:"), "{output}");
        assert!(output.contains("✗ rest_success_rate: rate>0.95 (observed 1.00)"), "{output}");
    }

    #[test]
    fn test_render_threshold_reason() {
        setup_no_color();
        let t = ThresholdResult {
            metric: "websocket_success_rate".to_string(),
            expression: "rate>0.85".to_string(),
            observed: None,
            passed: false,
            reason: Some("no data for websocket_success_rate".to_string()),
        };
        let line = render_threshold(&t);
        assert!(line.contains("(no data for websocket_success_rate)"), "{line}");
    }

    #[test]
    fn test_render_interrupted_warning() {
        setup_no_color();
        let mut result = result_with(&[], vec![]);
        result.interrupted = true;
        result.final_active_vus = 3;
        let output = render_summary(&result, &LoadTestConfig::websocket_default());
        assert!(output.contains("3 VUs were interrupted"), "{output}");
    }

    #[test]
    fn test_format_metric_row_padding() {
        let row = format_metric_row("abc", "1", 8);
        assert_eq!(row, "  abc.....: 1");
    }
}
