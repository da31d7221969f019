use serde::{Deserialize, Serialize};

use crate::error::ContractError;
use crate::stage::{EscalationSynthesis, StageContract};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Deciding to do nothing is a first-class outcome, not a fallback.
    ContinueMonitoring,
    EscalateToClinician,
}

impl Action {
    pub const LABELS: &'static [&'static str] = &["continue_monitoring", "escalate_to_clinician"];

    pub fn label(&self) -> &'static str {
        match self {
            Action::ContinueMonitoring => "continue_monitoring",
            Action::EscalateToClinician => "escalate_to_clinician",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Priority,
    Immediate,
}

impl Urgency {
    pub const LABELS: &'static [&'static str] = &["routine", "priority", "immediate"];

    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Routine => "routine",
            Urgency::Priority => "priority",
            Urgency::Immediate => "immediate",
        }
    }
}

/// Final output of a successful run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Present only when escalating.
    pub urgency: Option<Urgency>,
    pub confidence: f64,
    pub rationale: String,
    pub enrichment_invoked: bool,
}

impl Decision {
    /// Take the recommendation verbatim from the synthesis stage.
    ///
    /// The synthesis is re-checked so a decision can never violate the
    /// urgency rule even if the caller skipped validation.
    pub fn from_synthesis(
        synthesis: &EscalationSynthesis,
        enrichment_invoked: bool,
    ) -> Result<Self, ContractError> {
        synthesis.check()?;
        Ok(Self {
            action: synthesis.action,
            urgency: synthesis.urgency,
            confidence: synthesis.confidence,
            rationale: synthesis.rationale.clone(),
            enrichment_invoked,
        })
    }

    pub fn escalates(&self) -> bool {
        self.action == Action::EscalateToClinician
    }
}
