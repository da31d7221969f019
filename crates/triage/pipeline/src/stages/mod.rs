//! The three judgment stages.
//!
//! A stage assembles its typed input into a prompt, delegates the judgment
//! to the [`JudgmentBackend`], and enforces the output contract. It performs
//! no judgment logic of its own and never retries.

pub mod context;
pub mod signal;
pub mod synthesis;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use triage_types::{PipelineState, StageContract, StageKind};

use crate::error::PipelineError;
use crate::judgment::{JudgmentBackend, JudgmentRequest};

pub use context::{ContextAdjustmentInput, ContextAdjustmentStage};
pub use signal::SignalInterpretationStage;
pub use synthesis::{EscalationSynthesisInput, EscalationSynthesisStage};

/// Shared handle to the judgment capability plus the system prompt.
#[derive(Clone)]
pub struct Judge {
    backend: Arc<dyn JudgmentBackend>,
    system_prompt: Arc<str>,
}

impl Judge {
    pub fn new(backend: Arc<dyn JudgmentBackend>, system_prompt: impl Into<Arc<str>>) -> Self {
        Self {
            backend,
            system_prompt: system_prompt.into(),
        }
    }

    /// Invoke the backend once and validate the result as `T`.
    pub async fn ask<T: StageContract>(&self, description: String) -> Result<T, PipelineError> {
        let state = PipelineState::for_stage(T::KIND);
        let output_shape = T::output_shape();
        let user_prompt = format!(
            "{description}\n\nRespond with a JSON object of this shape:\n{}",
            output_shape.render_template()
        );
        let request = JudgmentRequest {
            system_prompt: self.system_prompt.to_string(),
            user_prompt,
            output_shape,
        };

        let value = self
            .backend
            .invoke(&request)
            .await
            .map_err(|e| e.into_pipeline(state))?;

        let output: T = serde_json::from_value(value).map_err(|e| {
            PipelineError::validation(state, format!("{} output: {e}", T::KIND))
        })?;
        output.check().map_err(|e| PipelineError::from((state, e)))?;

        debug!(
            stage = T::KIND.name(),
            uncertainty = output.uncertainty().value(),
            "Stage output validated"
        );
        Ok(output)
    }
}

/// One ordered judgment step.
#[async_trait]
pub trait JudgmentStage: Send + Sync {
    type Input: Send + Sync;
    type Output: StageContract;

    fn judge(&self) -> &Judge;

    /// Natural-language description of the input handed to the judgment call.
    fn describe(&self, input: &Self::Input) -> String;

    fn kind(&self) -> StageKind {
        Self::Output::KIND
    }

    async fn run(&self, input: &Self::Input) -> Result<Self::Output, PipelineError> {
        let description = self.describe(input);
        self.judge().ask::<Self::Output>(description).await
    }
}

pub(crate) fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
