//! Per-iteration context and result types shared by every test flow.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Explicit identity of one iteration, handed to a flow by the scheduler.
#[derive(Debug, Clone)]
pub struct IterationContext {
    /// 1-based id of the simulated client running this iteration.
    pub vu: u32,
    /// 0-based iteration number within that client.
    pub iteration: u64,
    /// Name of the scenario the iteration belongs to.
    pub scenario: Arc<str>,
}

impl IterationContext {
    /// Creates a context for iteration `iteration` of VU `vu`.
    pub fn new(vu: u32, iteration: u64, scenario: Arc<str>) -> Self {
        Self {
            vu,
            iteration,
            scenario,
        }
    }
}

impl fmt::Display for IterationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VU {} iteration {}", self.vu, self.iteration)
    }
}

/// Verdict of one iteration. Computed once and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationResult {
    /// Whether the iteration counts as a success.
    pub success: bool,
    /// Duration attributed to the iteration.
    pub duration: Duration,
}

impl IterationResult {
    /// A successful result.
    pub fn passed(duration: Duration) -> Self {
        Self {
            success: true,
            duration,
        }
    }

    /// A failed result.
    pub fn failed(duration: Duration) -> Self {
        Self {
            success: false,
            duration,
        }
    }
}
