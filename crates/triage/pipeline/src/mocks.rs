//! Test doubles for the pipeline's external collaborators.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use triage_store::{AuditError, AuditLog, AuditReceipt, AuditResult};
use triage_types::{
    AuditRecord, ContextFact, EnrichmentResult, LookupOutcome, PatientId, Reading,
    SignalSnapshot, StageKind, Urgency,
};

use crate::gate::{EnrichmentError, EnrichmentLookup};
use crate::judgment::{JudgmentBackend, JudgmentError, JudgmentRequest};
use crate::notify::{Notification, Notifier};
use crate::source::{PatientSource, SourceError};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Fixed timestamp `minutes` after a reference point, for building readings.
pub fn reading_at(minutes: i64) -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::minutes(minutes)
}

/// A 72-year-old on metformin with a rising heart rate.
pub fn sample_snapshot(patient_id: &str) -> SignalSnapshot {
    SignalSnapshot::builder(patient_id)
        .age(72)
        .reading(Reading::vital("heart_rate", 82.0, reading_at(0)))
        .reading(Reading::vital("heart_rate", 104.0, reading_at(60)))
        .reading(Reading::vital("systolic_bp", 128.0, reading_at(0)))
        .reading(Reading::vital("systolic_bp", 124.0, reading_at(60)))
        .reading(Reading::lab("CRP", 14.5, reading_at(30)).with_unit("mg/L"))
        .fact(ContextFact::condition("type 2 diabetes", reading_at(-10_000)))
        .fact(ContextFact::medication("metformin", reading_at(-9_000)))
        .build()
}

/// A younger patient whose vitals are flat.
pub fn stable_snapshot(patient_id: &str) -> SignalSnapshot {
    SignalSnapshot::builder(patient_id)
        .age(34)
        .reading(Reading::vital("heart_rate", 70.0, reading_at(0)))
        .reading(Reading::vital("heart_rate", 72.0, reading_at(60)))
        .reading(Reading::vital("spo2", 98.0, reading_at(0)))
        .reading(Reading::vital("spo2", 98.0, reading_at(60)))
        .build()
}

/// Judgment backend that answers each stage from a script.
///
/// Requests are routed by the name of the requested output shape. A stage
/// without a script is answered with [`JudgmentError::Unreachable`].
#[derive(Default)]
pub struct ScriptedJudgment {
    scripts: HashMap<&'static str, Result<Value, JudgmentError>>,
    delays: HashMap<&'static str, Duration>,
    requests: Mutex<Vec<JudgmentRequest>>,
}

impl ScriptedJudgment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, stage: StageKind, response: Result<Value, JudgmentError>) -> Self {
        self.scripts.insert(stage.name(), response);
        self
    }

    pub fn signal(self, state: &str, uncertainty: f64) -> Self {
        self.signal_raw(json!({
            "physiological_state": state,
            "key_findings": [format!("{state} course")],
            "uncertainty": uncertainty,
            "rationale": format!("signals read as {state}"),
        }))
    }

    pub fn signal_raw(self, value: Value) -> Self {
        self.respond(StageKind::SignalInterpretation, Ok(value))
    }

    pub fn context(self, risk: &str, uncertainty: f64) -> Self {
        self.context_raw(json!({
            "risk_level": risk,
            "risk_factors": ["age over 65", "type 2 diabetes"],
            "uncertainty": uncertainty,
            "rationale": format!("{risk} risk given age and comorbidity"),
        }))
    }

    pub fn context_raw(self, value: Value) -> Self {
        self.respond(StageKind::ContextAdjustment, Ok(value))
    }

    pub fn escalate(self, urgency: Urgency, confidence: f64, uncertainty: f64) -> Self {
        self.synthesis_raw(json!({
            "action": "escalate_to_clinician",
            "urgency": urgency.label(),
            "confidence": confidence,
            "uncertainty": uncertainty,
            "rationale": "deteriorating signals warrant clinician review",
        }))
    }

    pub fn monitor(self, confidence: f64, uncertainty: f64) -> Self {
        self.synthesis_raw(json!({
            "action": "continue_monitoring",
            "urgency": null,
            "confidence": confidence,
            "uncertainty": uncertainty,
            "rationale": "no deterioration that warrants review",
        }))
    }

    pub fn synthesis_raw(self, value: Value) -> Self {
        self.respond(StageKind::EscalationSynthesis, Ok(value))
    }

    pub fn fail(self, stage: StageKind, error: JudgmentError) -> Self {
        self.respond(stage, Err(error))
    }

    /// Delay the answer for one stage.
    pub fn delay(mut self, stage: StageKind, delay: Duration) -> Self {
        self.delays.insert(stage.name(), delay);
        self
    }

    pub fn requests(&self) -> Vec<JudgmentRequest> {
        locked(&self.requests).clone()
    }

    /// Output shapes requested so far, in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        locked(&self.requests)
            .iter()
            .map(|r| r.output_shape.name)
            .collect()
    }
}

#[async_trait]
impl JudgmentBackend for ScriptedJudgment {
    async fn invoke(&self, request: &JudgmentRequest) -> Result<Value, JudgmentError> {
        let shape = request.output_shape.name;
        locked(&self.requests).push(request.clone());

        if let Some(delay) = self.delays.get(shape) {
            tokio::time::sleep(*delay).await;
        }

        self.scripts
            .get(shape)
            .cloned()
            .unwrap_or_else(|| Err(JudgmentError::Unreachable(format!("no script for {shape}"))))
    }
}

/// Enrichment lookup with a fixed answer.
pub struct StaticEnrichment {
    outcome: Result<LookupOutcome, EnrichmentError>,
    queries: Mutex<Vec<String>>,
}

impl StaticEnrichment {
    fn with(outcome: Result<LookupOutcome, EnrichmentError>) -> Self {
        Self {
            outcome,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn matching(excerpt: &str, confidence_adjustment: f64) -> Self {
        Self::with(Ok(LookupOutcome::Matched(EnrichmentResult::new(
            excerpt,
            confidence_adjustment,
        ))))
    }

    pub fn no_match() -> Self {
        Self::with(Ok(LookupOutcome::NoMatch))
    }

    pub fn unavailable() -> Self {
        Self::with(Err(EnrichmentError::Unavailable("connection refused".into())))
    }

    pub fn queries(&self) -> Vec<String> {
        locked(&self.queries).clone()
    }
}

#[async_trait]
impl EnrichmentLookup for StaticEnrichment {
    async fn lookup(&self, query: &str) -> Result<LookupOutcome, EnrichmentError> {
        locked(&self.queries).push(query.to_string());
        self.outcome.clone()
    }
}

/// Patient source backed by a map.
#[derive(Default)]
pub struct InMemoryPatientSource {
    patients: HashMap<PatientId, SignalSnapshot>,
    unavailable: bool,
}

impl InMemoryPatientSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, snapshot: SignalSnapshot) -> Self {
        self.patients.insert(snapshot.patient_id().clone(), snapshot);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            patients: HashMap::new(),
            unavailable: true,
        }
    }
}

#[async_trait]
impl PatientSource for InMemoryPatientSource {
    async fn snapshot(&self, patient_id: &PatientId) -> Result<Option<SignalSnapshot>, SourceError> {
        if self.unavailable {
            return Err(SourceError::Unavailable("patient store offline".into()));
        }
        Ok(self.patients.get(patient_id).cloned())
    }
}

/// Notifier that keeps everything it was handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        locked(&self.sent).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        locked(&self.sent).push(notification);
    }
}

/// Audit log whose backend is gone: every read and write fails.
#[derive(Default)]
pub struct FailingAuditLog;

#[async_trait]
impl AuditLog for FailingAuditLog {
    async fn append(&self, _record: AuditRecord) -> AuditResult<AuditReceipt> {
        Err(AuditError::Backend("audit volume unavailable".into()))
    }

    async fn list_for(&self, _patient_id: &PatientId) -> AuditResult<Vec<AuditRecord>> {
        Err(AuditError::Backend("audit volume unavailable".into()))
    }
}
