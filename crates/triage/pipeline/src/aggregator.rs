//! Rolling uncertainty across stages.
//!
//! The running value is the maximum of everything observed so far, so a
//! single highly uncertain stage is never diluted by confident ones. The only
//! operation that can lower it is an enrichment adjustment.

use triage_types::{PipelineState, Uncertainty, UncertaintyPoint};

/// Combine the running uncertainty with a newly observed one.
///
/// Each input is clamped into `[0, 1]` first and NaN counts as total
/// uncertainty. Pure and total.
pub fn combine(previous: f64, next: f64) -> f64 {
    let previous = Uncertainty::saturating(previous).value();
    let next = Uncertainty::saturating(next).value();
    previous.max(next)
}

/// Running uncertainty for one run, with the trail of values it passed through.
#[derive(Debug, Clone, Default)]
pub struct UncertaintyAggregator {
    running: Uncertainty,
    trail: Vec<UncertaintyPoint>,
}

impl UncertaintyAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running(&self) -> Uncertainty {
        self.running
    }

    /// Fold a stage's uncertainty into the running value.
    pub fn observe(&mut self, state: PipelineState, uncertainty: Uncertainty) -> Uncertainty {
        self.running = Uncertainty::saturating(combine(self.running.value(), uncertainty.value()));
        self.record(state);
        self.running
    }

    /// Apply a signed enrichment adjustment: `max(0, running + delta)`,
    /// capped at 1.
    pub fn adjust(&mut self, state: PipelineState, delta: f64) -> Uncertainty {
        self.running = Uncertainty::saturating((self.running.value() + delta).max(0.0));
        self.record(state);
        self.running
    }

    pub fn trail(&self) -> &[UncertaintyPoint] {
        &self.trail
    }

    fn record(&mut self, state: PipelineState) {
        self.trail.push(UncertaintyPoint {
            state,
            value: self.running,
        });
    }
}
