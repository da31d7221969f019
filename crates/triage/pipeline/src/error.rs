use thiserror::Error;
use triage_store::ContextError;
use triage_types::{ContractError, FailureKind, PatientId, PipelineState, RunId};

/// External capabilities the pipeline depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    Judgment,
    Enrichment,
    PatientSource,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::Judgment => "judgment",
            Capability::Enrichment => "enrichment",
            Capability::PatientSource => "patient source",
        };
        write!(f, "{}", name)
    }
}

/// Problems that stop a run from starting at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("enrichment threshold must be finite and within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("run timeout must be greater than zero")]
    ZeroTimeout,

    #[error("enrichment excerpt bound must be greater than zero")]
    ZeroExcerptBound,

    #[error("pipeline is missing its {0}")]
    MissingCollaborator(&'static str),

    #[error("no snapshot available for {0}")]
    PatientNotFound(PatientId),

    #[error("snapshot for {0} has no readings")]
    EmptySnapshot(PatientId),

    #[error("snapshot for {0} is missing static patient context (age)")]
    MissingStaticContext(PatientId),

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Errors surfaced by [`TriagePipeline`](crate::TriagePipeline).
///
/// Errors are returned to the caller verbatim; none are retried inside the
/// pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("validation failed in {state}: {reason}")]
    Validation {
        state: PipelineState,
        reason: String,
    },

    #[error("{capability} unavailable in {state}: {reason}")]
    UpstreamUnavailable {
        capability: Capability,
        state: PipelineState,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("run deadline of {timeout_ms}ms exceeded in {state}")]
    DeadlineExceeded { state: PipelineState, timeout_ms: u64 },

    #[error("run cancelled in {state}")]
    Cancelled { state: PipelineState },

    #[error("internal error in {state}: {reason}")]
    Internal {
        state: PipelineState,
        reason: String,
    },

    /// The audit record for a run could not be persisted. `outcome` holds
    /// the failure that ended the run, if it did not succeed.
    #[error("audit write failed for {run_id}: {reason}")]
    AuditWrite {
        run_id: RunId,
        reason: String,
        outcome: Option<Box<PipelineError>>,
    },

    /// Audit records could not be read back. No run is involved.
    #[error("audit read failed for {patient_id}: {reason}")]
    AuditRead { patient_id: PatientId, reason: String },
}

impl PipelineError {
    pub fn validation(state: PipelineState, reason: impl Into<String>) -> Self {
        PipelineError::Validation {
            state,
            reason: reason.into(),
        }
    }

    pub fn unavailable(
        capability: Capability,
        state: PipelineState,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::UpstreamUnavailable {
            capability,
            state,
            reason: reason.into(),
        }
    }

    pub fn internal(state: PipelineState, reason: impl Into<String>) -> Self {
        PipelineError::Internal {
            state,
            reason: reason.into(),
        }
    }

    /// Category recorded in a failed audit record.
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Validation { .. } => FailureKind::Validation,
            PipelineError::UpstreamUnavailable { .. } => FailureKind::UpstreamUnavailable,
            PipelineError::Configuration(_) => FailureKind::Configuration,
            PipelineError::DeadlineExceeded { .. } => FailureKind::DeadlineExceeded,
            PipelineError::Cancelled { .. } => FailureKind::Cancelled,
            PipelineError::Internal { .. }
            | PipelineError::AuditWrite { .. }
            | PipelineError::AuditRead { .. } => FailureKind::Internal,
        }
    }

    /// Whether the host may reasonably retry the whole run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::UpstreamUnavailable { .. } | PipelineError::DeadlineExceeded { .. }
        )
    }
}

impl From<(PipelineState, ContractError)> for PipelineError {
    fn from((state, err): (PipelineState, ContractError)) -> Self {
        match err {
            ContractError::IllegalTransition { .. }
            | ContractError::EnrichmentFlagMismatch { .. }
            | ContractError::IncompleteRecord(_)
            | ContractError::Serialization(_) => PipelineError::internal(state, err.to_string()),
            _ => PipelineError::validation(state, err.to_string()),
        }
    }
}

impl From<(PipelineState, ContextError)> for PipelineError {
    fn from((state, err): (PipelineState, ContextError)) -> Self {
        PipelineError::internal(state, err.to_string())
    }
}
