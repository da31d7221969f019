//! Per-run context.
//!
//! A [`RunContext`] owns the immutable snapshot, the run's state and path,
//! the running uncertainty, and a scope in the shared [`ContextStore`]. The
//! scope is discarded when the context is dropped, so nothing from a run
//! survives it except what the audit log persists.

use std::sync::Arc;

use tracing::debug;
use triage_store::ContextStore;
use triage_types::{
    ContextAdjustment, EnrichmentRecord, EscalationSynthesis, PipelineState, RunId, RunProgress,
    SignalInterpretation, SignalSnapshot, SnapshotRef, StageContract, Uncertainty,
};

use crate::aggregator::UncertaintyAggregator;
use crate::error::PipelineError;

pub struct RunContext {
    run_id: RunId,
    snapshot: Arc<SignalSnapshot>,
    snapshot_ref: SnapshotRef,
    store: Arc<ContextStore>,
    state: PipelineState,
    path: Vec<PipelineState>,
    enrichment: Option<EnrichmentRecord>,
    aggregator: UncertaintyAggregator,
}

impl RunContext {
    /// Start a run in `INIT` with a fresh run id and store scope.
    pub fn open(
        store: Arc<ContextStore>,
        snapshot: Arc<SignalSnapshot>,
    ) -> Result<Self, PipelineError> {
        let state = PipelineState::Init;
        let snapshot_ref = snapshot
            .reference()
            .map_err(|e| PipelineError::from((state, e)))?;
        let run_id = RunId::generate();
        store
            .open(run_id)
            .map_err(|e| PipelineError::from((state, e)))?;

        Ok(Self {
            run_id,
            snapshot,
            snapshot_ref,
            store,
            state,
            path: vec![state],
            enrichment: None,
            aggregator: UncertaintyAggregator::new(),
        })
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn snapshot(&self) -> &SignalSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to `next`, enforcing the transition table.
    pub fn advance(&mut self, next: PipelineState) -> Result<(), PipelineError> {
        let state = self.state;
        self.state = state
            .transition(next)
            .map_err(|e| PipelineError::from((state, e)))?;
        self.path.push(next);
        debug!(run_id = %self.run_id, from = %state, to = %next, "Run advanced");
        Ok(())
    }

    /// Store a stage output and fold its uncertainty into the running value.
    pub fn record<T: StageContract>(&mut self, output: T) -> Result<Uncertainty, PipelineError> {
        let expected = PipelineState::for_stage(T::KIND);
        if self.state != expected {
            return Err(PipelineError::internal(
                self.state,
                format!("{} output recorded outside {expected}", T::KIND),
            ));
        }

        let uncertainty = output.uncertainty();
        self.store
            .put(self.run_id, T::KIND, output.into_output())
            .map_err(|e| PipelineError::from((self.state, e)))?;
        Ok(self.aggregator.observe(expected, uncertainty))
    }

    pub fn output<T: StageContract>(&self) -> Option<T> {
        self.store.get_as::<T>(self.run_id)
    }

    pub fn running(&self) -> Uncertainty {
        self.aggregator.running()
    }

    pub fn aggregator_mut(&mut self) -> &mut UncertaintyAggregator {
        &mut self.aggregator
    }

    pub fn set_enrichment(&mut self, record: EnrichmentRecord) {
        self.enrichment = Some(record);
    }

    pub fn enrichment(&self) -> Option<&EnrichmentRecord> {
        self.enrichment.as_ref()
    }

    /// Everything accumulated so far, for sealing into an audit record.
    pub fn progress(&self) -> RunProgress {
        RunProgress {
            run_id: self.run_id,
            snapshot: self.snapshot_ref.clone(),
            signal_interpretation: self.output::<SignalInterpretation>(),
            context_adjustment: self.output::<ContextAdjustment>(),
            escalation_synthesis: self.output::<EscalationSynthesis>(),
            enrichment: self.enrichment.clone(),
            uncertainty_trail: self.aggregator.trail().to_vec(),
            path: self.path.clone(),
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.store.discard(self.run_id);
    }
}
