use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::stage::StageKind;

/// States of a single pipeline run.
///
/// ```text
/// INIT -> STAGE1 -> STAGE2 -> GATE_CHECK -> (ENRICH) -> STAGE3 -> AUDITED
///   \________\_________\__________\____________\__________\---> FAILED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Init,
    Stage1,
    Stage2,
    GateCheck,
    Enrich,
    Stage3,
    Audited,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Audited | PipelineState::Failed)
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Failed {
            return true;
        }
        matches!(
            (self, next),
            (Init, Stage1)
                | (Stage1, Stage2)
                | (Stage2, GateCheck)
                | (GateCheck, Enrich)
                | (GateCheck, Stage3)
                | (Enrich, Stage3)
                | (Stage3, Audited)
        )
    }

    /// Checked transition.
    pub fn transition(self, next: PipelineState) -> Result<PipelineState, ContractError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(ContractError::IllegalTransition { from: self, to: next })
        }
    }

    /// State in which the given stage runs.
    pub fn for_stage(kind: StageKind) -> Self {
        match kind {
            StageKind::SignalInterpretation => PipelineState::Stage1,
            StageKind::ContextAdjustment => PipelineState::Stage2,
            StageKind::EscalationSynthesis => PipelineState::Stage3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::Stage1 => "STAGE1",
            PipelineState::Stage2 => "STAGE2",
            PipelineState::GateCheck => "GATE_CHECK",
            PipelineState::Enrich => "ENRICH",
            PipelineState::Stage3 => "STAGE3",
            PipelineState::Audited => "AUDITED",
            PipelineState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
