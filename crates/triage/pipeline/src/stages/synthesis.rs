use std::fmt::Write;

use async_trait::async_trait;
use triage_types::{
    ContextAdjustment, DecisionLogEntry, EnrichmentRecord, EscalationSynthesis, LookupOutcome,
    SignalInterpretation, StaticContext, Uncertainty,
};

use super::{list_or_none, JudgmentStage, Judge};

/// Input to stage 3: everything the run has accumulated.
#[derive(Clone, Debug)]
pub struct EscalationSynthesisInput {
    pub interpretation: SignalInterpretation,
    pub adjustment: ContextAdjustment,
    pub context: StaticContext,
    /// Present only if the enrichment gate fired.
    pub enrichment: Option<EnrichmentRecord>,
    /// Running uncertainty after the gate, possibly lowered by enrichment.
    pub running_uncertainty: Uncertainty,
    /// Latest earlier decision for the same patient, shown as context only.
    pub prior_decision: Option<DecisionLogEntry>,
}

/// Stage 3: decide whether a clinician should review the patient now.
#[derive(Clone)]
pub struct EscalationSynthesisStage {
    judge: Judge,
}

impl EscalationSynthesisStage {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl JudgmentStage for EscalationSynthesisStage {
    type Input = EscalationSynthesisInput;
    type Output = EscalationSynthesis;

    fn judge(&self) -> &Judge {
        &self.judge
    }

    fn describe(&self, input: &EscalationSynthesisInput) -> String {
        let mut out = String::from(
            "Decide whether this patient should be escalated for clinical review now \
             (escalate_to_clinician) or continue routine monitoring (continue_monitoring).\n\
             Set urgency (routine, priority or immediate) only when escalating, otherwise null.\n\
             Continuing to monitor is a valid outcome when the evidence supports it.\n\n",
        );

        let interp = &input.interpretation;
        let _ = writeln!(
            out,
            "Signal interpretation: {} (uncertainty {}). {}",
            interp.physiological_state.label(),
            interp.uncertainty,
            interp.rationale
        );
        let adj = &input.adjustment;
        let _ = writeln!(
            out,
            "Context adjustment: {} risk (uncertainty {}). Factors: {}. {}",
            adj.risk_level.label(),
            adj.uncertainty,
            list_or_none(&adj.risk_factors),
            adj.rationale
        );
        let _ = writeln!(
            out,
            "Patient: age {}, conditions: {}, medications: {}",
            input
                .context
                .age
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            list_or_none(&input.context.conditions),
            list_or_none(&input.context.medications)
        );

        match input.enrichment.as_ref().map(|e| &e.outcome) {
            Some(LookupOutcome::Matched(result)) => {
                let _ = writeln!(out, "Reference material: {}", result.excerpt);
            }
            Some(LookupOutcome::NoMatch) => {
                out.push_str("Reference material: consulted, no relevant match.\n");
            }
            None => {}
        }

        if let Some(prior) = &input.prior_decision {
            let _ = writeln!(
                out,
                "Previous decision ({}): {} with confidence {}",
                prior.timestamp.to_rfc3339(),
                prior.decision.action.label(),
                prior.decision.confidence
            );
        }

        let _ = write!(
            out,
            "Combined uncertainty so far: {}",
            input.running_uncertainty
        );
        out
    }
}
