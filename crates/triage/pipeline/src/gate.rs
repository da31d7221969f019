//! Enrichment gate.
//!
//! Between stage 2 and stage 3 the running uncertainty is compared with the
//! configured threshold. Strictly above it, the gate builds a deterministic
//! query from the run so far and consults a bounded lookup. A match may move
//! the running uncertainty; this is the only place it can go down.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use triage_types::{
    ContextAdjustment, EnrichmentRecord, LookupOutcome, PipelineState, SignalInterpretation,
    Uncertainty,
};

use crate::aggregator::UncertaintyAggregator;
use crate::config::EnrichmentConfig;
use crate::error::{Capability, PipelineError};
use crate::run::RunContext;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EnrichmentError {
    #[error("enrichment lookup unavailable: {0}")]
    Unavailable(String),

    #[error("enrichment lookup timed out")]
    Timeout,
}

/// Bounded, non-generative lookup consulted when uncertainty is high.
#[async_trait]
pub trait EnrichmentLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<LookupOutcome, EnrichmentError>;
}

/// Outcome of the gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub fire: bool,
    /// Lookup query, present only when the gate fires.
    pub query: Option<String>,
}

/// Strict comparison: uncertainty equal to the threshold does not fire.
pub fn fires(running: f64, threshold: f64) -> bool {
    running > threshold
}

pub struct EnrichmentGate {
    threshold: f64,
    max_excerpt_chars: usize,
    lookup: Arc<dyn EnrichmentLookup>,
}

impl EnrichmentGate {
    pub fn new(config: &EnrichmentConfig, lookup: Arc<dyn EnrichmentLookup>) -> Self {
        Self {
            threshold: config.threshold,
            max_excerpt_chars: config.max_excerpt_chars,
            lookup,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(&self, running: Uncertainty, run: &RunContext) -> GateDecision {
        let fire = fires(running.value(), self.threshold);
        debug!(
            run_id = %run.run_id(),
            running = running.value(),
            threshold = self.threshold,
            fire,
            "Gate evaluated"
        );
        GateDecision {
            fire,
            query: fire.then(|| build_query(run)),
        }
    }

    /// Consult the lookup. The returned record exists whether or not it matched.
    pub async fn enrich(&self, query: String) -> Result<EnrichmentRecord, PipelineError> {
        let state = PipelineState::Enrich;
        let outcome = self.lookup.lookup(&query).await.map_err(|e| {
            PipelineError::unavailable(Capability::Enrichment, state, e.to_string())
        })?;

        let outcome = match outcome {
            LookupOutcome::Matched(result) => {
                result.check().map_err(|e| PipelineError::from((state, e)))?;
                LookupOutcome::Matched(result.bounded(self.max_excerpt_chars))
            }
            LookupOutcome::NoMatch => LookupOutcome::NoMatch,
        };
        Ok(EnrichmentRecord { query, outcome })
    }

    /// Fold a lookup result into the running uncertainty. No match leaves it unchanged.
    pub fn apply(
        &self,
        record: &EnrichmentRecord,
        aggregator: &mut UncertaintyAggregator,
    ) -> Uncertainty {
        match record.result() {
            Some(result) => aggregator.adjust(PipelineState::Enrich, result.confidence_adjustment),
            None => aggregator.running(),
        }
    }
}

/// Deterministic lookup query from the stage-1 state, the top stage-2 risk
/// factor and the static context.
fn build_query(run: &RunContext) -> String {
    let state = run
        .output::<SignalInterpretation>()
        .map(|o| o.physiological_state.label())
        .unwrap_or("unknown");
    let risk_factor = run
        .output::<ContextAdjustment>()
        .and_then(|o| o.top_risk_factor().map(str::to_string))
        .unwrap_or_else(|| "none".to_string());
    let ctx = run.snapshot().static_context();
    let age = ctx
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let joined = |items: &[String]| {
        if items.is_empty() {
            "none".to_string()
        } else {
            items.join(",")
        }
    };

    format!(
        "state={state}; risk_factor={risk_factor}; age={age}; conditions={}; medications={}",
        joined(&ctx.conditions),
        joined(&ctx.medications)
    )
}
