use thiserror::Error;
use triage_types::{RunId, StageKind};

/// Result type for audit log operations.
pub type AuditResult<T> = Result<T, AuditError>;

/// Errors from the audit log. None of these are retried by the pipeline.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit record for {0} already exists")]
    DuplicateRun(RunId),

    #[error("audit chain broken at sequence {sequence}")]
    ChainBroken { sequence: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors from the run-scoped context store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContextError {
    #[error("no open scope for {0}")]
    RunNotOpen(RunId),

    #[error("scope for {0} is already open")]
    RunAlreadyOpen(RunId),

    #[error("{stage} output already recorded for {run_id}")]
    DuplicateOutput { run_id: RunId, stage: StageKind },

    #[error("key {key} does not match {found} output")]
    KeyMismatch { key: StageKind, found: StageKind },
}
