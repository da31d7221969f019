//! Scoped key/value store for intermediate stage outputs.
//!
//! Each run gets its own scope keyed by [`RunId`]; scopes are sharded by
//! `dashmap`, so concurrent runs never contend on a shared lock. The decision
//! history is a second, longer-lived namespace keyed by patient.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;
use triage_types::{DecisionLogEntry, PatientId, RunId, StageContract, StageKind, StageOutput};

use crate::error::ContextError;

#[derive(Debug, Default)]
struct RunScope {
    outputs: BTreeMap<StageKind, StageOutput>,
}

#[derive(Debug, Default)]
pub struct ContextStore {
    runs: DashMap<RunId, RunScope>,
    history: DashMap<PatientId, Vec<DecisionLogEntry>>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Run namespace ───────────────────────────────────────────────

    pub fn open(&self, run_id: RunId) -> Result<(), ContextError> {
        match self.runs.entry(run_id) {
            Entry::Occupied(_) => Err(ContextError::RunAlreadyOpen(run_id)),
            Entry::Vacant(slot) => {
                slot.insert(RunScope::default());
                debug!(run_id = %run_id, "Context scope opened");
                Ok(())
            }
        }
    }

    /// Record a stage output. Each key is written at most once per run.
    pub fn put(
        &self,
        run_id: RunId,
        key: StageKind,
        value: StageOutput,
    ) -> Result<(), ContextError> {
        if value.kind() != key {
            return Err(ContextError::KeyMismatch {
                key,
                found: value.kind(),
            });
        }

        let mut scope = self
            .runs
            .get_mut(&run_id)
            .ok_or(ContextError::RunNotOpen(run_id))?;

        if scope.outputs.contains_key(&key) {
            return Err(ContextError::DuplicateOutput { run_id, stage: key });
        }
        scope.outputs.insert(key, value);
        Ok(())
    }

    pub fn get(&self, run_id: RunId, key: StageKind) -> Option<StageOutput> {
        self.runs
            .get(&run_id)
            .and_then(|scope| scope.outputs.get(&key).cloned())
    }

    /// Typed read of a stage output.
    pub fn get_as<T: StageContract>(&self, run_id: RunId) -> Option<T> {
        self.get(run_id, T::KIND).and_then(T::from_output)
    }

    /// All outputs recorded for a run, in stage order.
    pub fn outputs(&self, run_id: RunId) -> Vec<StageOutput> {
        self.runs
            .get(&run_id)
            .map(|scope| scope.outputs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Drop a run's scope. Returns whether a scope existed.
    pub fn discard(&self, run_id: RunId) -> bool {
        let existed = self.runs.remove(&run_id).is_some();
        if existed {
            debug!(run_id = %run_id, "Context scope discarded");
        }
        existed
    }

    pub fn is_open(&self, run_id: RunId) -> bool {
        self.runs.contains_key(&run_id)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }

    // ── History namespace ───────────────────────────────────────────

    /// Append to the patient's decision history.
    pub fn record_decision(&self, entry: DecisionLogEntry) {
        self.history
            .entry(entry.patient_id.clone())
            .or_default()
            .push(entry);
    }

    /// Decision history for a patient, oldest first.
    pub fn decision_history(&self, patient_id: &PatientId) -> Vec<DecisionLogEntry> {
        self.history
            .get(patient_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn latest_decision(&self, patient_id: &PatientId) -> Option<DecisionLogEntry> {
        self.history
            .get(patient_id)
            .and_then(|entries| entries.last().cloned())
    }
}
