//! Pass/fail threshold rules evaluated over the final metrics snapshot.
//!
//! A threshold pairs a metric selector (`rest_success_rate`,
//! `http_req_duration{name:GetUser}`) with an expression such as
//! `rate>0.95` or `p(95)<1000`. Selectors and expressions use k6 syntax.

use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{MetricKey, MetricKind, MetricsSnapshot};

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(rate|count|avg|min|max|med|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$",
    )
    .expect("threshold expression pattern is valid")
});

static SELECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)(?:\{([^:{}]+):([^{}]*)\})?$")
        .expect("metric selector pattern is valid")
});

/// Statistic a threshold reads from a metric series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Rate,
    Count,
    Avg,
    Min,
    Max,
    Med,
    Percentile(f64),
}

impl Aggregation {
    /// Whether this statistic exists for a series of `kind`.
    pub fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => !matches!(self, Self::Rate),
            MetricKind::Rate => matches!(self, Self::Rate | Self::Count),
            MetricKind::Counter => matches!(self, Self::Count),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rate => f.write_str("rate"),
            Self::Count => f.write_str("count"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Percentile(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }

    /// Applies the comparison as `observed <op> target`.
    pub fn holds(self, observed: f64, target: f64) -> bool {
        match self {
            Self::Lt => observed < target,
            Self::Le => observed <= target,
            Self::Gt => observed > target,
            Self::Ge => observed >= target,
            Self::Eq => (observed - target).abs() < f64::EPSILON,
            Self::Ne => (observed - target).abs() >= f64::EPSILON,
        }
    }
}

/// One parsed threshold rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricKey,
    pub expression: String,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub target: f64,
}

/// Verdict of one threshold after a run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ThresholdResult {
    /// Selector in `name{key:value}` form.
    pub metric: String,
    pub expression: String,
    /// Value the expression was checked against, if the series had data.
    pub observed: Option<f64>,
    pub passed: bool,
    /// Why the threshold could not be checked, when it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parses a metric selector: `name` or `name{key:value}`.
pub fn parse_selector(selector: &str) -> Result<MetricKey, LoadTestError> {
    let caps = SELECTOR_RE
        .captures(selector.trim())
        .ok_or_else(|| LoadTestError::Threshold {
            expression: selector.to_string(),
            reason: "expected a metric name, optionally followed by {tag:value}".to_string(),
        })?;

    let name = &caps[1];
    Ok(match (caps.get(2), caps.get(3)) {
        (Some(key), Some(value)) => MetricKey::tagged(name, key.as_str().trim(), value.as_str().trim()),
        _ => MetricKey::new(name),
    })
}

impl Threshold {
    /// Parses `expression` for the metric selected by `selector`.
    pub fn parse(selector: &str, expression: &str) -> Result<Self, LoadTestError> {
        let metric = parse_selector(selector)?;
        let invalid = |reason: &str| LoadTestError::Threshold {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let caps = EXPRESSION_RE
            .captures(expression)
            .ok_or_else(|| invalid("expected <aggregation><op><number>, e.g. p(95)<1000"))?;

        let aggregation = match (&caps[1], caps.get(2)) {
            (_, Some(p)) => {
                let p: f64 = p.as_str().parse().map_err(|_| invalid("bad percentile"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregation::Percentile(p)
            },
            ("rate", None) => Aggregation::Rate,
            ("count", None) => Aggregation::Count,
            ("avg", None) => Aggregation::Avg,
            ("min", None) => Aggregation::Min,
            ("max", None) => Aggregation::Max,
            ("med", None) => Aggregation::Med,
            _ => return Err(invalid("unknown aggregation")),
        };

        let comparison = Comparison::parse(&caps[3]).ok_or_else(|| invalid("unknown operator"))?;
        let target: f64 = caps[4].parse().map_err(|_| invalid("bad number"))?;

        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            aggregation,
            comparison,
            target,
        })
    }

    /// Reads the aggregation from `snapshot` and checks the comparison.
    ///
    /// A series with no data, or whose kind has no such aggregation, fails.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let observed = self.observe(snapshot);
        let (observed, passed, reason) = match observed {
            Ok(value) => (Some(value), self.comparison.holds(value, self.target), None),
            Err(reason) => (None, false, Some(reason)),
        };

        ThresholdResult {
            metric: self.metric.to_string(),
            expression: self.expression.clone(),
            observed,
            passed,
            reason,
        }
    }

    fn observe(&self, snapshot: &MetricsSnapshot) -> Result<f64, String> {
        let key = &self.metric;
        let mismatch = |kind: MetricKind| {
            format!("{} is not available on {kind} metric {key}", self.aggregation)
        };

        if let Some(trend) = snapshot.trend(key) {
            if !self.aggregation.applies_to(MetricKind::Trend) {
                return Err(mismatch(MetricKind::Trend));
            }
            if trend.count == 0 {
                return Err(format!("no data for {key}"));
            }
            return Ok(match self.aggregation {
                Aggregation::Count => trend.count as f64,
                Aggregation::Avg => trend.avg,
                Aggregation::Min => trend.min,
                Aggregation::Max => trend.max,
                Aggregation::Med => trend.med,
                Aggregation::Percentile(p) => trend.percentile(p),
                Aggregation::Rate => unreachable!("rejected by applies_to"),
            });
        }

        if let Some(rate) = snapshot.rate(key) {
            if !self.aggregation.applies_to(MetricKind::Rate) {
                return Err(mismatch(MetricKind::Rate));
            }
            if rate.total() == 0 {
                return Err(format!("no data for {key}"));
            }
            return Ok(match self.aggregation {
                Aggregation::Count => rate.total() as f64,
                _ => rate.rate(),
            });
        }

        if let Some(count) = snapshot.counter(key) {
            if !self.aggregation.applies_to(MetricKind::Counter) {
                return Err(mismatch(MetricKind::Counter));
            }
            return Ok(count as f64);
        }

        Err(format!("no data for {key}"))
    }
}

/// Parses every `selector = [expressions]` entry of a thresholds table, in
/// selector order.
pub fn parse_thresholds(table: &BTreeMap<String, Vec<String>>) -> Result<Vec<Threshold>, LoadTestError> {
    table
        .iter()
        .flat_map(|(selector, expressions)| {
            expressions
                .iter()
                .map(move |expression| Threshold::parse(selector, expression))
        })
        .collect()
}

/// Evaluates every threshold against `snapshot`, preserving the order of `thresholds`.
pub fn evaluate_thresholds(thresholds: &[Threshold], snapshot: &MetricsSnapshot) -> Vec<ThresholdResult> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}

/// Returns `true` when no threshold failed.
pub fn all_passed(results: &[ThresholdResult]) -> bool {
    results.iter().all(|r| r.passed)
}
