//! Audit records.
//!
//! One record is written per run, completed or failed. The serialized form
//! is a flat object with snake_case field names and is a stable contract for
//! downstream consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::Decision;
use crate::enrichment::EnrichmentRecord;
use crate::error::ContractError;
use crate::ids::{PatientId, RunId};
use crate::snapshot::SnapshotRef;
use crate::stage::{ContextAdjustment, EscalationSynthesis, SignalInterpretation, StageKind};
use crate::state::PipelineState;
use crate::uncertainty::Uncertainty;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Category of the error that ended a failed run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    UpstreamUnavailable,
    Configuration,
    DeadlineExceeded,
    Cancelled,
    Internal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// State the run was in when it failed.
    pub state: PipelineState,
    pub kind: FailureKind,
    pub message: String,
}

/// Running uncertainty as observed after a given state.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyPoint {
    pub state: PipelineState,
    pub value: Uncertainty,
}

/// Everything a run accumulated, ready to be sealed into an [`AuditRecord`].
#[derive(Clone, Debug)]
pub struct RunProgress {
    pub run_id: RunId,
    pub snapshot: SnapshotRef,
    pub signal_interpretation: Option<SignalInterpretation>,
    pub context_adjustment: Option<ContextAdjustment>,
    pub escalation_synthesis: Option<EscalationSynthesis>,
    pub enrichment: Option<EnrichmentRecord>,
    pub uncertainty_trail: Vec<UncertaintyPoint>,
    pub path: Vec<PipelineState>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub run_id: RunId,
    pub patient_id: PatientId,
    pub timestamp: DateTime<Utc>,
    pub status: RunStatus,
    pub snapshot: SnapshotRef,
    pub signal_interpretation: Option<SignalInterpretation>,
    pub context_adjustment: Option<ContextAdjustment>,
    pub escalation_synthesis: Option<EscalationSynthesis>,
    pub enrichment: Option<EnrichmentRecord>,
    pub enrichment_invoked: bool,
    pub uncertainty_trail: Vec<UncertaintyPoint>,
    pub final_uncertainty: Uncertainty,
    pub path: Vec<PipelineState>,
    pub decision: Option<Decision>,
    pub failure: Option<FailureInfo>,
}

impl AuditRecord {
    /// Seal a successful run. All three stage outputs and a decision are required.
    pub fn completed(progress: RunProgress, decision: Decision) -> Result<Self, ContractError> {
        if progress.signal_interpretation.is_none() {
            return Err(ContractError::IncompleteRecord("signal_interpretation"));
        }
        if progress.context_adjustment.is_none() {
            return Err(ContractError::IncompleteRecord("context_adjustment"));
        }
        if progress.escalation_synthesis.is_none() {
            return Err(ContractError::IncompleteRecord("escalation_synthesis"));
        }
        if progress.path.last() != Some(&PipelineState::Audited) {
            return Err(ContractError::IncompleteRecord("terminal AUDITED state"));
        }
        if decision.enrichment_invoked != progress.enrichment.is_some() {
            return Err(ContractError::EnrichmentFlagMismatch {
                flag: decision.enrichment_invoked,
            });
        }
        Ok(Self::seal(progress, RunStatus::Completed, Some(decision), None))
    }

    /// Seal a failed run, preserving whatever stages completed.
    pub fn failed(mut progress: RunProgress, failure: FailureInfo) -> Self {
        if progress.path.last() != Some(&PipelineState::Failed) {
            progress.path.push(PipelineState::Failed);
        }
        Self::seal(progress, RunStatus::Failed, None, Some(failure))
    }

    fn seal(
        progress: RunProgress,
        status: RunStatus,
        decision: Option<Decision>,
        failure: Option<FailureInfo>,
    ) -> Self {
        let final_uncertainty = progress
            .uncertainty_trail
            .last()
            .map(|p| p.value)
            .unwrap_or(Uncertainty::ZERO);

        Self {
            run_id: progress.run_id,
            patient_id: progress.snapshot.patient_id.clone(),
            timestamp: Utc::now(),
            status,
            snapshot: progress.snapshot,
            signal_interpretation: progress.signal_interpretation,
            context_adjustment: progress.context_adjustment,
            escalation_synthesis: progress.escalation_synthesis,
            enrichment_invoked: progress.enrichment.is_some(),
            enrichment: progress.enrichment,
            uncertainty_trail: progress.uncertainty_trail,
            final_uncertainty,
            path: progress.path,
            decision,
            failure,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RunStatus::Failed
    }

    /// Stages whose output this record carries, in pipeline order.
    pub fn completed_stages(&self) -> Vec<StageKind> {
        let mut stages = Vec::with_capacity(3);
        if self.signal_interpretation.is_some() {
            stages.push(StageKind::SignalInterpretation);
        }
        if self.context_adjustment.is_some() {
            stages.push(StageKind::ContextAdjustment);
        }
        if self.escalation_synthesis.is_some() {
            stages.push(StageKind::EscalationSynthesis);
        }
        stages
    }
}
