//! Boundary to the external judgment capability.
//!
//! The capability receives a natural-language description of the stage input
//! and the required output shape, and returns a JSON value. The pipeline
//! never trusts that value: every stage deserializes and checks it before use.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use triage_types::{PipelineState, SchemaDescriptor};

use crate::error::{Capability, PipelineError};

/// Request passed to a judgment backend.
#[derive(Debug, Clone)]
pub struct JudgmentRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub output_shape: SchemaDescriptor,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum JudgmentError {
    #[error("judgment call timed out")]
    Timeout,

    #[error("judgment capability unreachable: {0}")]
    Unreachable(String),

    #[error("output does not match {shape}: {reason}")]
    SchemaMismatch { shape: String, reason: String },
}

impl JudgmentError {
    pub(crate) fn into_pipeline(self, state: PipelineState) -> PipelineError {
        match self {
            JudgmentError::Timeout | JudgmentError::Unreachable(_) => {
                PipelineError::unavailable(Capability::Judgment, state, self.to_string())
            }
            JudgmentError::SchemaMismatch { .. } => {
                PipelineError::validation(state, self.to_string())
            }
        }
    }
}

/// Trait implemented by judgment backends.
#[async_trait]
pub trait JudgmentBackend: Send + Sync {
    /// Produce one judgment. Implementations must not retry internally on
    /// behalf of the pipeline's callers; retry policy belongs to the host.
    async fn invoke(&self, request: &JudgmentRequest) -> Result<Value, JudgmentError>;
}
