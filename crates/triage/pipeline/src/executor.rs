//! Pipeline executor.
//!
//! [`TriagePipeline`] drives one run per call through
//! `INIT → STAGE1 → STAGE2 → GATE_CHECK → [ENRICH] → STAGE3 → AUDITED`, or to
//! `FAILED` from wherever an error surfaces. Each run produces exactly one
//! audit record. Runs share no mutable state apart from the context store's
//! decision history and the audit log, so any number may execute
//! concurrently on one pipeline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use triage_store::{AuditLog, ContextStore};
use triage_types::{
    AuditRecord, Decision, DecisionLogEntry, FailureInfo, PatientId, PipelineState, SignalSnapshot,
};

use crate::cancel::CancellationToken;
use crate::config::PipelineConfig;
use crate::error::{Capability, ConfigurationError, PipelineError};
use crate::gate::{EnrichmentGate, EnrichmentLookup};
use crate::judgment::JudgmentBackend;
use crate::notify::{Notification, Notifier, TracingNotifier};
use crate::run::RunContext;
use crate::source::PatientSource;
use crate::stages::{
    ContextAdjustmentInput, ContextAdjustmentStage, EscalationSynthesisInput,
    EscalationSynthesisStage, Judge, JudgmentStage, SignalInterpretationStage,
};

/// Name written into the decision history for entries logged by a run.
const LOGGED_BY: &str = "triage-pipeline";

/// Deadline and cancellation shared by every external call of one run.
struct CallBudget<'a> {
    deadline: Instant,
    timeout_ms: u64,
    cancel: &'a CancellationToken,
}

impl CallBudget<'_> {
    async fn call<T, F>(&self, state: PipelineState, call: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled { state });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled { state }),
            result = tokio::time::timeout_at(self.deadline, call) => match result {
                Ok(result) => result,
                Err(_) => Err(PipelineError::DeadlineExceeded {
                    state,
                    timeout_ms: self.timeout_ms,
                }),
            },
        }
    }
}

/// Staged triage pipeline.
pub struct TriagePipeline {
    config: PipelineConfig,
    signal: SignalInterpretationStage,
    context: ContextAdjustmentStage,
    synthesis: EscalationSynthesisStage,
    gate: EnrichmentGate,
    source: Arc<dyn PatientSource>,
    audit_log: Arc<dyn AuditLog>,
    store: Arc<ContextStore>,
    notifier: Arc<dyn Notifier>,
}

impl TriagePipeline {
    pub fn builder(config: PipelineConfig) -> TriagePipelineBuilder {
        TriagePipelineBuilder::new(config)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context_store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Run the pipeline once for a patient.
    pub async fn run_pipeline(&self, patient_id: &PatientId) -> Result<Decision, PipelineError> {
        self.run_pipeline_with_cancel(patient_id, CancellationToken::new())
            .await
    }

    /// Run the pipeline once, aborting to `FAILED` if `cancel` fires first.
    #[instrument(skip(self, cancel), fields(patient_id = %patient_id))]
    pub async fn run_pipeline_with_cancel(
        &self,
        patient_id: &PatientId,
        cancel: CancellationToken,
    ) -> Result<Decision, PipelineError> {
        let timeout_ms = self.config.run.timeout_ms;
        let budget = CallBudget {
            deadline: Instant::now() + Duration::from_millis(timeout_ms),
            timeout_ms,
            cancel: &cancel,
        };

        let snapshot = self.acquire_snapshot(patient_id, &budget).await?;
        let mut run = RunContext::open(self.store.clone(), Arc::new(snapshot))?;
        info!(run_id = %run.run_id(), "Run started");

        let (decision, record) = match self.execute(&mut run, &budget).await {
            Ok(sealed) => sealed,
            Err(err) => return Err(self.fail(&mut run, err).await),
        };

        let run_id = run.run_id();
        let receipt = self.audit_log.append(record).await.map_err(|e| {
            error!(run_id = %run_id, error = %e, "Audit write failed for completed run");
            PipelineError::AuditWrite {
                run_id,
                reason: e.to_string(),
                outcome: None,
            }
        })?;

        self.store.record_decision(DecisionLogEntry::new(
            patient_id.clone(),
            run_id,
            decision.clone(),
            LOGGED_BY,
        ));
        if let Some(notification) = Notification::for_decision(patient_id, run_id, &decision) {
            self.notifier.notify(notification);
        }

        info!(
            run_id = %run_id,
            action = decision.action.label(),
            urgency = ?decision.urgency,
            confidence = decision.confidence,
            enrichment_invoked = decision.enrichment_invoked,
            sequence = receipt.sequence,
            "Run audited"
        );
        Ok(decision)
    }

    /// Audit records for a patient, in write order.
    pub async fn list_for(&self, patient_id: &PatientId) -> Result<Vec<AuditRecord>, PipelineError> {
        self.audit_log
            .list_for(patient_id)
            .await
            .map_err(|e| PipelineError::AuditRead {
                patient_id: patient_id.clone(),
                reason: e.to_string(),
            })
    }

    pub fn decision_history(&self, patient_id: &PatientId) -> Vec<DecisionLogEntry> {
        self.store.decision_history(patient_id)
    }

    async fn acquire_snapshot(
        &self,
        patient_id: &PatientId,
        budget: &CallBudget<'_>,
    ) -> Result<SignalSnapshot, PipelineError> {
        let state = PipelineState::Init;
        let snapshot = budget
            .call(state, async {
                self.source.snapshot(patient_id).await.map_err(|e| {
                    PipelineError::unavailable(Capability::PatientSource, state, e.to_string())
                })
            })
            .await?
            .ok_or_else(|| ConfigurationError::PatientNotFound(patient_id.clone()))?;

        if snapshot.is_empty() {
            return Err(ConfigurationError::EmptySnapshot(patient_id.clone()).into());
        }
        if snapshot.age().is_none() {
            return Err(ConfigurationError::MissingStaticContext(patient_id.clone()).into());
        }
        Ok(snapshot)
    }

    /// Drive the run from `INIT` to `AUDITED` and seal the completed record.
    async fn execute(
        &self,
        run: &mut RunContext,
        budget: &CallBudget<'_>,
    ) -> Result<(Decision, AuditRecord), PipelineError> {
        run.advance(PipelineState::Stage1)?;
        let interpretation = budget
            .call(PipelineState::Stage1, self.signal.run(run.snapshot()))
            .await?;
        let running = run.record(interpretation.clone())?;
        debug!(run_id = %run.run_id(), running = running.value(), "Signal interpretation recorded");

        run.advance(PipelineState::Stage2)?;
        let input = ContextAdjustmentInput {
            interpretation: interpretation.clone(),
            context: run.snapshot().static_context(),
        };
        let adjustment = budget
            .call(PipelineState::Stage2, self.context.run(&input))
            .await?;
        let running = run.record(adjustment.clone())?;
        debug!(run_id = %run.run_id(), running = running.value(), "Context adjustment recorded");

        run.advance(PipelineState::GateCheck)?;
        let gate = self.gate.evaluate(running, run);
        if let Some(query) = gate.query {
            run.advance(PipelineState::Enrich)?;
            let record = budget
                .call(PipelineState::Enrich, self.gate.enrich(query))
                .await?;
            let adjusted = self.gate.apply(&record, run.aggregator_mut());
            info!(
                run_id = %run.run_id(),
                matched = record.result().is_some(),
                threshold = self.gate.threshold(),
                before = running.value(),
                after = adjusted.value(),
                "Enrichment consulted"
            );
            run.set_enrichment(record);
        }

        run.advance(PipelineState::Stage3)?;
        let input = EscalationSynthesisInput {
            interpretation,
            adjustment,
            context: run.snapshot().static_context(),
            enrichment: run.enrichment().cloned(),
            running_uncertainty: run.running(),
            prior_decision: self.store.latest_decision(run.snapshot().patient_id()),
        };
        let synthesis = budget
            .call(PipelineState::Stage3, self.synthesis.run(&input))
            .await?;
        run.record(synthesis.clone())?;

        let decision = Decision::from_synthesis(&synthesis, run.enrichment().is_some())
            .map_err(|e| PipelineError::from((PipelineState::Stage3, e)))?;

        run.advance(PipelineState::Audited)?;
        let record = AuditRecord::completed(run.progress(), decision.clone())
            .map_err(|e| PipelineError::from((PipelineState::Audited, e)))?;
        Ok((decision, record))
    }

    /// Move the run to `FAILED` and persist its failed record.
    async fn fail(&self, run: &mut RunContext, err: PipelineError) -> PipelineError {
        let state = run.state();
        if !state.is_terminal() && run.advance(PipelineState::Failed).is_err() {
            debug!(run_id = %run.run_id(), from = %state, "Run could not enter FAILED");
        }

        warn!(
            run_id = %run.run_id(),
            state = %state,
            kind = ?err.kind(),
            error = %err,
            "Run failed"
        );

        let record = AuditRecord::failed(
            run.progress(),
            FailureInfo {
                state,
                kind: err.kind(),
                message: err.to_string(),
            },
        );
        match self.audit_log.append(record).await {
            Ok(receipt) => {
                debug!(run_id = %run.run_id(), sequence = receipt.sequence, "Failed run audited");
                err
            }
            Err(audit_err) => {
                error!(run_id = %run.run_id(), error = %audit_err, "Audit write failed for failed run");
                PipelineError::AuditWrite {
                    run_id: run.run_id(),
                    reason: audit_err.to_string(),
                    outcome: Some(Box::new(err)),
                }
            }
        }
    }
}

/// Builder for [`TriagePipeline`].
pub struct TriagePipelineBuilder {
    config: PipelineConfig,
    judgment: Option<Arc<dyn JudgmentBackend>>,
    enrichment: Option<Arc<dyn EnrichmentLookup>>,
    source: Option<Arc<dyn PatientSource>>,
    audit_log: Option<Arc<dyn AuditLog>>,
    store: Option<Arc<ContextStore>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl TriagePipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            judgment: None,
            enrichment: None,
            source: None,
            audit_log: None,
            store: None,
            notifier: None,
        }
    }

    pub fn judgment(mut self, backend: Arc<dyn JudgmentBackend>) -> Self {
        self.judgment = Some(backend);
        self
    }

    pub fn enrichment(mut self, lookup: Arc<dyn EnrichmentLookup>) -> Self {
        self.enrichment = Some(lookup);
        self
    }

    pub fn source(mut self, source: Arc<dyn PatientSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn audit_log(mut self, audit_log: Arc<dyn AuditLog>) -> Self {
        self.audit_log = Some(audit_log);
        self
    }

    /// Share a context store, and with it the decision history, between pipelines.
    pub fn context_store(mut self, store: Arc<ContextStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Validate the configuration and assemble the pipeline.
    ///
    /// The judgment backend, enrichment lookup, patient source and audit log
    /// are required. The context store and notifier default to a fresh
    /// [`ContextStore`] and [`TracingNotifier`].
    pub fn build(self) -> Result<TriagePipeline, PipelineError> {
        self.config.validate()?;

        let backend = self
            .judgment
            .ok_or(ConfigurationError::MissingCollaborator("judgment backend"))?;
        let lookup = self
            .enrichment
            .ok_or(ConfigurationError::MissingCollaborator("enrichment lookup"))?;
        let source = self
            .source
            .ok_or(ConfigurationError::MissingCollaborator("patient source"))?;
        let audit_log = self
            .audit_log
            .ok_or(ConfigurationError::MissingCollaborator("audit log"))?;

        let judge = Judge::new(backend, self.config.judgment.system_prompt.as_str());
        Ok(TriagePipeline {
            signal: SignalInterpretationStage::new(judge.clone()),
            context: ContextAdjustmentStage::new(judge.clone()),
            synthesis: EscalationSynthesisStage::new(judge),
            gate: EnrichmentGate::new(&self.config.enrichment, lookup),
            source,
            audit_log,
            store: self.store.unwrap_or_default(),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotifier)),
            config: self.config,
        })
    }
}
