use thiserror::Error;

use crate::stage::StageKind;
use crate::state::PipelineState;

/// Violations of the data model's contracts.
///
/// These are raised when a value is constructed or checked, never
/// repaired in place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error("uncertainty must be within [0, 1], got {0}")]
    UncertaintyOutOfRange(f64),

    #[error("confidence must be within [0, 1], got {0}")]
    ConfidenceOutOfRange(f64),

    #[error("{0} output has an empty rationale")]
    EmptyRationale(StageKind),

    #[error("escalation to a clinician requires an urgency")]
    MissingUrgency,

    #[error("continued monitoring must not carry an urgency")]
    UnexpectedUrgency,

    #[error("enrichment adjustment must be finite and within [-1, 1], got {0}")]
    AdjustmentOutOfRange(f64),

    #[error("illegal pipeline transition: {from} -> {to}")]
    IllegalTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("decision enrichment flag ({flag}) disagrees with recorded enrichment")]
    EnrichmentFlagMismatch { flag: bool },

    #[error("audit record is incomplete: missing {0}")]
    IncompleteRecord(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),
}
