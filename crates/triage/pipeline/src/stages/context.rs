use async_trait::async_trait;
use triage_types::{ContextAdjustment, SignalInterpretation, StaticContext};

use super::{list_or_none, JudgmentStage, Judge};

/// Input to stage 2: the stage-1 interpretation plus static patient context.
#[derive(Clone, Debug)]
pub struct ContextAdjustmentInput {
    pub interpretation: SignalInterpretation,
    pub context: StaticContext,
}

/// Stage 2: adjust risk for who the patient is.
#[derive(Clone)]
pub struct ContextAdjustmentStage {
    judge: Judge,
}

impl ContextAdjustmentStage {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl JudgmentStage for ContextAdjustmentStage {
    type Input = ContextAdjustmentInput;
    type Output = ContextAdjustment;

    fn judge(&self) -> &Judge {
        &self.judge
    }

    fn describe(&self, input: &ContextAdjustmentInput) -> String {
        let interp = &input.interpretation;
        let ctx = &input.context;
        let age = ctx
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Assess this patient's risk level given their signal interpretation and static context.\n\
             Classify risk as low, moderate, elevated or high, and list risk factors with the most \
             significant first.\n\n\
             Signal interpretation:\n\
             - Physiological state: {state}\n\
             - Key findings: {findings}\n\
             - Interpretation uncertainty: {unc}\n\
             - Rationale: {rationale}\n\n\
             Patient context:\n\
             - Age: {age}\n\
             - Conditions: {conditions}\n\
             - Medications: {medications}",
            state = interp.physiological_state.label(),
            findings = list_or_none(&interp.key_findings),
            unc = interp.uncertainty,
            rationale = interp.rationale,
            age = age,
            conditions = list_or_none(&ctx.conditions),
            medications = list_or_none(&ctx.medications),
        )
    }
}
