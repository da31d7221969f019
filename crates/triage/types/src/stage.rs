//! Stage contracts and the typed outputs of the three judgment stages.
//!
//! Every output carries a mandatory [`Uncertainty`] and a free-text
//! rationale. Outputs are produced once per stage per run and never mutated.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::decision::{Action, Urgency};
use crate::error::ContractError;
use crate::schema::{FieldKind, FieldSpec, SchemaDescriptor};
use crate::uncertainty::Uncertainty;

/// The three ordered judgment stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    SignalInterpretation,
    ContextAdjustment,
    EscalationSynthesis,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::SignalInterpretation => "signal_interpretation",
            StageKind::ContextAdjustment => "context_adjustment",
            StageKind::EscalationSynthesis => "escalation_synthesis",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhysiologicalState {
    Stable,
    Improving,
    Declining,
    Uncertain,
}

impl PhysiologicalState {
    pub const LABELS: &'static [&'static str] = &["stable", "improving", "declining", "uncertain"];

    pub fn label(&self) -> &'static str {
        match self {
            PhysiologicalState::Stable => "stable",
            PhysiologicalState::Improving => "improving",
            PhysiologicalState::Declining => "declining",
            PhysiologicalState::Uncertain => "uncertain",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    Elevated,
    High,
}

impl RiskLevel {
    pub const LABELS: &'static [&'static str] = &["low", "moderate", "elevated", "high"];

    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Elevated => "elevated",
            RiskLevel::High => "high",
        }
    }
}

/// Stage 1: what the raw signals say about the patient's physiological course.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalInterpretation {
    pub physiological_state: PhysiologicalState,
    #[serde(default)]
    pub key_findings: Vec<String>,
    pub uncertainty: Uncertainty,
    pub rationale: String,
}

/// Stage 2: risk once the interpretation is weighed against static context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextAdjustment {
    pub risk_level: RiskLevel,
    /// Most significant factor first.
    #[serde(default)]
    pub risk_factors: Vec<String>,
    pub uncertainty: Uncertainty,
    pub rationale: String,
}

impl ContextAdjustment {
    pub fn top_risk_factor(&self) -> Option<&str> {
        self.risk_factors.first().map(String::as_str)
    }
}

/// Stage 3: the recommendation itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationSynthesis {
    pub action: Action,
    #[serde(default)]
    pub urgency: Option<Urgency>,
    pub confidence: f64,
    pub uncertainty: Uncertainty,
    pub rationale: String,
}

/// Tagged union over the three stage outputs, as held by the context store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageOutput {
    SignalInterpretation(SignalInterpretation),
    ContextAdjustment(ContextAdjustment),
    EscalationSynthesis(EscalationSynthesis),
}

impl StageOutput {
    pub fn kind(&self) -> StageKind {
        match self {
            StageOutput::SignalInterpretation(_) => StageKind::SignalInterpretation,
            StageOutput::ContextAdjustment(_) => StageKind::ContextAdjustment,
            StageOutput::EscalationSynthesis(_) => StageKind::EscalationSynthesis,
        }
    }
}

/// Contract every stage output type satisfies.
///
/// The serde shape is the structural half of the contract; [`check`](Self::check)
/// enforces the semantic half that a schema cannot express.
pub trait StageContract: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: StageKind;

    /// Output shape handed to the judgment capability.
    fn output_shape() -> SchemaDescriptor;

    fn uncertainty(&self) -> Uncertainty;

    fn rationale(&self) -> &str;

    fn check(&self) -> Result<(), ContractError> {
        if self.rationale().trim().is_empty() {
            return Err(ContractError::EmptyRationale(Self::KIND));
        }
        Ok(())
    }

    fn into_output(self) -> StageOutput;

    fn from_output(output: StageOutput) -> Option<Self>;
}

fn uncertainty_field() -> FieldSpec {
    FieldSpec::new("uncertainty", FieldKind::Number { min: 0.0, max: 1.0 })
}

fn rationale_field() -> FieldSpec {
    FieldSpec::new("rationale", FieldKind::Text)
}

impl StageContract for SignalInterpretation {
    const KIND: StageKind = StageKind::SignalInterpretation;

    fn output_shape() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "signal_interpretation",
            vec![
                FieldSpec::new(
                    "physiological_state",
                    FieldKind::Choice {
                        options: PhysiologicalState::LABELS,
                    },
                ),
                FieldSpec::new("key_findings", FieldKind::TextList),
                uncertainty_field(),
                rationale_field(),
            ],
        )
    }

    fn uncertainty(&self) -> Uncertainty {
        self.uncertainty
    }

    fn rationale(&self) -> &str {
        &self.rationale
    }

    fn into_output(self) -> StageOutput {
        StageOutput::SignalInterpretation(self)
    }

    fn from_output(output: StageOutput) -> Option<Self> {
        match output {
            StageOutput::SignalInterpretation(o) => Some(o),
            _ => None,
        }
    }
}

impl StageContract for ContextAdjustment {
    const KIND: StageKind = StageKind::ContextAdjustment;

    fn output_shape() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "context_adjustment",
            vec![
                FieldSpec::new(
                    "risk_level",
                    FieldKind::Choice {
                        options: RiskLevel::LABELS,
                    },
                ),
                FieldSpec::new("risk_factors", FieldKind::TextList),
                uncertainty_field(),
                rationale_field(),
            ],
        )
    }

    fn uncertainty(&self) -> Uncertainty {
        self.uncertainty
    }

    fn rationale(&self) -> &str {
        &self.rationale
    }

    fn into_output(self) -> StageOutput {
        StageOutput::ContextAdjustment(self)
    }

    fn from_output(output: StageOutput) -> Option<Self> {
        match output {
            StageOutput::ContextAdjustment(o) => Some(o),
            _ => None,
        }
    }
}

impl StageContract for EscalationSynthesis {
    const KIND: StageKind = StageKind::EscalationSynthesis;

    fn output_shape() -> SchemaDescriptor {
        SchemaDescriptor::new(
            "escalation_synthesis",
            vec![
                FieldSpec::new(
                    "action",
                    FieldKind::Choice {
                        options: Action::LABELS,
                    },
                ),
                FieldSpec::new(
                    "urgency",
                    FieldKind::OptionalChoice {
                        options: Urgency::LABELS,
                    },
                ),
                FieldSpec::new("confidence", FieldKind::Number { min: 0.0, max: 1.0 }),
                uncertainty_field(),
                rationale_field(),
            ],
        )
    }

    fn uncertainty(&self) -> Uncertainty {
        self.uncertainty
    }

    fn rationale(&self) -> &str {
        &self.rationale
    }

    fn check(&self) -> Result<(), ContractError> {
        if self.rationale.trim().is_empty() {
            return Err(ContractError::EmptyRationale(Self::KIND));
        }
        if self.confidence.is_nan() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ContractError::ConfidenceOutOfRange(self.confidence));
        }
        match (self.action, self.urgency) {
            (Action::EscalateToClinician, None) => Err(ContractError::MissingUrgency),
            (Action::ContinueMonitoring, Some(_)) => Err(ContractError::UnexpectedUrgency),
            _ => Ok(()),
        }
    }

    fn into_output(self) -> StageOutput {
        StageOutput::EscalationSynthesis(self)
    }

    fn from_output(output: StageOutput) -> Option<Self> {
        match output {
            StageOutput::EscalationSynthesis(o) => Some(o),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn synthesis(action: Action, urgency: Option<Urgency>) -> EscalationSynthesis {
        EscalationSynthesis {
            action,
            urgency,
            confidence: 0.8,
            uncertainty: Uncertainty::new(0.2).unwrap(),
            rationale: "heart rate climbing".into(),
        }
    }

    #[test]
    fn parses_signal_interpretation() {
        let value = json!({
            "physiological_state": "declining",
            "key_findings": ["heart rate increasing"],
            "uncertainty": 0.3,
            "rationale": "tachycardia trend"
        });
        let parsed: SignalInterpretation = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.physiological_state, PhysiologicalState::Declining);
        assert!(parsed.check().is_ok());
    }

    #[test]
    fn rejects_unknown_label_and_range() {
        let bad_label = json!({
            "risk_level": "catastrophic",
            "uncertainty": 0.3,
            "rationale": "x"
        });
        assert!(serde_json::from_value::<ContextAdjustment>(bad_label).is_err());

        let bad_range = json!({
            "risk_level": "low",
            "uncertainty": 1.3,
            "rationale": "x"
        });
        assert!(serde_json::from_value::<ContextAdjustment>(bad_range).is_err());
    }

    #[test]
    fn escalation_requires_urgency() {
        assert_eq!(
            synthesis(Action::EscalateToClinician, None).check(),
            Err(ContractError::MissingUrgency)
        );
        assert_eq!(
            synthesis(Action::ContinueMonitoring, Some(Urgency::Routine)).check(),
            Err(ContractError::UnexpectedUrgency)
        );
        assert!(synthesis(Action::EscalateToClinician, Some(Urgency::Priority))
            .check()
            .is_ok());
        assert!(synthesis(Action::ContinueMonitoring, None).check().is_ok());
    }

    #[test]
    fn empty_rationale_is_rejected() {
        let mut out = synthesis(Action::ContinueMonitoring, None);
        out.rationale = "   ".into();
        assert_eq!(
            out.check(),
            Err(ContractError::EmptyRationale(StageKind::EscalationSynthesis))
        );
    }

    #[test]
    fn stage_output_is_tagged() {
        let output = synthesis(Action::ContinueMonitoring, None).into_output();
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["stage"], "escalation_synthesis");
        assert_eq!(value["action"], "continue_monitoring");

        let back: StageOutput = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), StageKind::EscalationSynthesis);
        assert!(EscalationSynthesis::from_output(back).is_some());
    }

    #[test]
    fn output_shapes_name_every_field() {
        let shape = EscalationSynthesis::output_shape();
        for field in ["action", "urgency", "confidence", "uncertainty", "rationale"] {
            assert!(shape.field(field).is_some(), "missing {field}");
        }
    }
}
