use std::sync::Arc;
use std::time::Duration;

use triage_pipeline::error::Capability;
use triage_pipeline::mocks::{
    reading_at, sample_snapshot, stable_snapshot, FailingAuditLog, InMemoryPatientSource,
    RecordingNotifier, ScriptedJudgment, StaticEnrichment,
};
use triage_pipeline::{
    CancellationToken, ConfigurationError, JudgmentError, NotificationKind, PipelineConfig,
    PipelineError, TriagePipeline,
};
use triage_store::{verify_chain, InMemoryAuditLog};
use triage_types::{
    Action, FailureKind, PatientId, PipelineState, Reading, RunStatus, SignalSnapshot, StageKind,
    Urgency,
};

struct Harness {
    pipeline: Arc<TriagePipeline>,
    judgment: Arc<ScriptedJudgment>,
    enrichment: Arc<StaticEnrichment>,
    audit: Arc<InMemoryAuditLog>,
    notifier: Arc<RecordingNotifier>,
}

fn setup_harness(
    config: PipelineConfig,
    judgment: ScriptedJudgment,
    enrichment: StaticEnrichment,
    patients: Vec<SignalSnapshot>,
) -> Harness {
    let judgment = Arc::new(judgment);
    let enrichment = Arc::new(enrichment);
    let audit = Arc::new(InMemoryAuditLog::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let source = patients
        .into_iter()
        .fold(InMemoryPatientSource::new(), |source, snapshot| {
            source.with(snapshot)
        });

    let pipeline = TriagePipeline::builder(config)
        .judgment(judgment.clone())
        .enrichment(enrichment.clone())
        .source(Arc::new(source))
        .audit_log(audit.clone())
        .notifier(notifier.clone())
        .build()
        .unwrap();

    Harness {
        pipeline: Arc::new(pipeline),
        judgment,
        enrichment,
        audit,
        notifier,
    }
}

fn pid(id: &str) -> PatientId {
    PatientId::new(id)
}

// ── Completed runs ──────────────────────────────────────────────────

#[tokio::test]
async fn clear_deterioration_escalates_without_enrichment() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("declining", 0.3)
            .context("elevated", 0.35)
            .escalate(Urgency::Priority, 0.78, 0.2),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P001")],
    );

    let decision = h.pipeline.run_pipeline(&pid("P001")).await.unwrap();
    assert_eq!(decision.action, Action::EscalateToClinician);
    assert_eq!(decision.urgency, Some(Urgency::Priority));
    assert_eq!(decision.confidence, 0.78);
    assert!(!decision.enrichment_invoked);
    assert!(h.enrichment.queries().is_empty());

    let records = h.pipeline.list_for(&pid("P001")).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RunStatus::Completed);
    assert_eq!(record.decision.as_ref(), Some(&decision));
    assert!(record.enrichment.is_none());
    assert!(!record.enrichment_invoked);
    assert_eq!(record.final_uncertainty.value(), 0.35);
    assert_eq!(
        record.path,
        vec![
            PipelineState::Init,
            PipelineState::Stage1,
            PipelineState::Stage2,
            PipelineState::GateCheck,
            PipelineState::Stage3,
            PipelineState::Audited,
        ]
    );

    let sent = h.notifier.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::ClinicalEscalation);
    assert_eq!(sent[0].urgency, Some(Urgency::Priority));
}

#[tokio::test]
async fn ambiguous_signals_trigger_enrichment_and_lower_uncertainty() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("uncertain", 0.7)
            .context("moderate", 0.5)
            .monitor(0.72, 0.3),
        StaticEnrichment::matching(
            "Isolated tachycardia in older adults on metformin is often benign",
            -0.2,
        ),
        vec![sample_snapshot("P002")],
    );

    let decision = h.pipeline.run_pipeline(&pid("P002")).await.unwrap();
    assert_eq!(decision.action, Action::ContinueMonitoring);
    assert!(decision.urgency.is_none());
    assert!(decision.enrichment_invoked);

    assert_eq!(
        h.enrichment.queries(),
        vec![
            "state=uncertain; risk_factor=age over 65; age=72; \
             conditions=type 2 diabetes; medications=metformin"
                .to_string()
        ]
    );

    let synthesis_prompt = h
        .judgment
        .requests()
        .into_iter()
        .find(|r| r.output_shape.name == StageKind::EscalationSynthesis.name())
        .map(|r| r.user_prompt)
        .unwrap();
    assert!(synthesis_prompt.contains("Reference material: Isolated tachycardia"));
    assert!(synthesis_prompt.contains("Combined uncertainty so far: 0.500"));

    let record = &h.pipeline.list_for(&pid("P002")).await.unwrap()[0];
    assert!(record.enrichment_invoked);
    assert!(record.enrichment.as_ref().and_then(|e| e.result()).is_some());
    assert!((record.final_uncertainty.value() - 0.5).abs() < 1e-9);
    assert!(record.path.contains(&PipelineState::Enrich));
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn stable_patient_continues_monitoring() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("stable", 0.1)
            .context("low", 0.1)
            .monitor(0.95, 0.05),
        StaticEnrichment::no_match(),
        vec![stable_snapshot("P003")],
    );

    let decision = h.pipeline.run_pipeline(&pid("P003")).await.unwrap();
    assert_eq!(decision.action, Action::ContinueMonitoring);
    assert!(decision.urgency.is_none());
    assert_eq!(decision.confidence, 0.95);
    assert!(!decision.enrichment_invoked);
    assert!(h.enrichment.queries().is_empty());
    assert_eq!(
        h.judgment.calls(),
        vec![
            "signal_interpretation",
            "context_adjustment",
            "escalation_synthesis"
        ]
    );

    let history = h.pipeline.decision_history(&pid("P003"));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].decision, decision);
    assert_eq!(history[0].logged_by, "triage-pipeline");

    let record = &h.pipeline.list_for(&pid("P003")).await.unwrap()[0];
    assert_eq!(record.final_uncertainty.value(), 0.1);
    assert!(!record.enrichment_invoked);
}

#[tokio::test]
async fn no_match_still_counts_as_invoked() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("uncertain", 0.8)
            .context("moderate", 0.4)
            .escalate(Urgency::Routine, 0.6, 0.3),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P004")],
    );

    let decision = h.pipeline.run_pipeline(&pid("P004")).await.unwrap();
    assert!(decision.enrichment_invoked);

    let record = &h.pipeline.list_for(&pid("P004")).await.unwrap()[0];
    assert_eq!(record.final_uncertainty.value(), 0.8);
    assert!(record.enrichment.as_ref().unwrap().result().is_none());
}

#[tokio::test]
async fn uncertainty_at_threshold_does_not_enrich() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("uncertain", 0.6)
            .context("moderate", 0.3)
            .monitor(0.7, 0.2),
        StaticEnrichment::matching("unused", -0.3),
        vec![sample_snapshot("P005")],
    );
    let decision = h.pipeline.run_pipeline(&pid("P005")).await.unwrap();
    assert!(!decision.enrichment_invoked);
    assert!(h.enrichment.queries().is_empty());

    let lowered = setup_harness(
        PipelineConfig::default().with_threshold(0.5),
        ScriptedJudgment::new()
            .signal("uncertain", 0.6)
            .context("moderate", 0.3)
            .monitor(0.7, 0.2),
        StaticEnrichment::matching("guideline", -0.3),
        vec![sample_snapshot("P005")],
    );
    let decision = lowered.pipeline.run_pipeline(&pid("P005")).await.unwrap();
    assert!(decision.enrichment_invoked);
}

#[tokio::test]
async fn repeated_runs_keep_every_record() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("declining", 0.2)
            .context("elevated", 0.2)
            .escalate(Urgency::Immediate, 0.9, 0.1),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P006")],
    );

    h.pipeline.run_pipeline(&pid("P006")).await.unwrap();
    h.pipeline.run_pipeline(&pid("P006")).await.unwrap();

    let records = h.pipeline.list_for(&pid("P006")).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_ne!(records[0].run_id, records[1].run_id);
    assert_eq!(records[0].snapshot.digest, records[1].snapshot.digest);
    assert_eq!(h.pipeline.decision_history(&pid("P006")).len(), 2);

    let second_synthesis = h
        .judgment
        .requests()
        .into_iter()
        .filter(|r| r.output_shape.name == "escalation_synthesis")
        .nth(1)
        .unwrap();
    assert!(second_synthesis.user_prompt.contains("Previous decision"));

    verify_chain(&h.audit.entries().unwrap()).unwrap();
    assert_eq!(h.pipeline.context_store().active_runs(), 0);
}

#[tokio::test]
async fn concurrent_runs_are_isolated() {
    let patients: Vec<String> = (0..8).map(|i| format!("C{i:03}")).collect();
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("stable", 0.1)
            .context("low", 0.1)
            .monitor(0.9, 0.05),
        StaticEnrichment::no_match(),
        patients.iter().map(|p| stable_snapshot(p)).collect(),
    );

    let mut handles = Vec::new();
    for patient in &patients {
        let pipeline = h.pipeline.clone();
        let patient_id = pid(patient);
        handles.push(tokio::spawn(async move {
            pipeline.run_pipeline(&patient_id).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for patient in &patients {
        let records = h.pipeline.list_for(&pid(patient)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].patient_id, pid(patient));
    }
    assert_eq!(h.audit.len().unwrap(), patients.len());
    verify_chain(&h.audit.entries().unwrap()).unwrap();
}

// ── Failed runs ─────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_stage_two_output_fails_with_partial_record() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("declining", 0.3)
            .context("catastrophic", 0.2)
            .escalate(Urgency::Priority, 0.8, 0.1),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P010")],
    );

    let err = h.pipeline.run_pipeline(&pid("P010")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Validation {
            state: PipelineState::Stage2,
            ..
        }
    ));
    assert_eq!(
        h.judgment.calls(),
        vec!["signal_interpretation", "context_adjustment"]
    );

    let records = h.pipeline.list_for(&pid("P010")).await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.status, RunStatus::Failed);
    assert!(record.signal_interpretation.is_some());
    assert!(record.context_adjustment.is_none());
    assert!(record.escalation_synthesis.is_none());
    assert!(record.decision.is_none());
    assert_eq!(record.path.last(), Some(&PipelineState::Failed));

    let failure = record.failure.as_ref().unwrap();
    assert_eq!(failure.state, PipelineState::Stage2);
    assert_eq!(failure.kind, FailureKind::Validation);

    assert!(h.pipeline.decision_history(&pid("P010")).is_empty());
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn missing_uncertainty_is_a_validation_failure() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new().signal_raw(serde_json::json!({
            "physiological_state": "declining",
            "key_findings": [],
            "rationale": "heart rate rising"
        })),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P011")],
    );

    let err = h.pipeline.run_pipeline(&pid("P011")).await.unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    let record = &h.pipeline.list_for(&pid("P011")).await.unwrap()[0];
    assert!(record.signal_interpretation.is_none());
    assert_eq!(record.failure.as_ref().unwrap().state, PipelineState::Stage1);
}

#[tokio::test]
async fn unreachable_judgment_is_upstream_failure() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("stable", 0.1)
            .fail(StageKind::ContextAdjustment, JudgmentError::Timeout),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P012")],
    );

    let err = h.pipeline.run_pipeline(&pid("P012")).await.unwrap_err();
    assert!(err.is_transient());
    assert!(matches!(
        err,
        PipelineError::UpstreamUnavailable {
            capability: Capability::Judgment,
            state: PipelineState::Stage2,
            ..
        }
    ));
    let record = &h.pipeline.list_for(&pid("P012")).await.unwrap()[0];
    assert_eq!(
        record.failure.as_ref().unwrap().kind,
        FailureKind::UpstreamUnavailable
    );
}

#[tokio::test]
async fn unavailable_enrichment_fails_in_enrich() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("uncertain", 0.9)
            .context("moderate", 0.4)
            .monitor(0.7, 0.2),
        StaticEnrichment::unavailable(),
        vec![sample_snapshot("P013")],
    );

    let err = h.pipeline.run_pipeline(&pid("P013")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UpstreamUnavailable {
            capability: Capability::Enrichment,
            state: PipelineState::Enrich,
            ..
        }
    ));
    let record = &h.pipeline.list_for(&pid("P013")).await.unwrap()[0];
    assert!(record.signal_interpretation.is_some());
    assert!(record.context_adjustment.is_some());
    assert!(record.enrichment.is_none());
    assert_eq!(
        h.judgment.calls(),
        vec!["signal_interpretation", "context_adjustment"]
    );
}

#[tokio::test]
async fn deadline_aborts_the_run() {
    let h = setup_harness(
        PipelineConfig::default().with_timeout_ms(50),
        ScriptedJudgment::new()
            .signal("declining", 0.2)
            .context("high", 0.2)
            .delay(StageKind::ContextAdjustment, Duration::from_secs(10))
            .escalate(Urgency::Priority, 0.8, 0.1),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P020")],
    );

    let err = h.pipeline.run_pipeline(&pid("P020")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::DeadlineExceeded {
            state: PipelineState::Stage2,
            timeout_ms: 50
        }
    ));
    let record = &h.pipeline.list_for(&pid("P020")).await.unwrap()[0];
    assert_eq!(
        record.failure.as_ref().unwrap().kind,
        FailureKind::DeadlineExceeded
    );
    assert!(record.signal_interpretation.is_some());
}

#[tokio::test]
async fn cancellation_aborts_the_run() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("declining", 0.2)
            .delay(StageKind::SignalInterpretation, Duration::from_secs(10)),
        StaticEnrichment::no_match(),
        vec![sample_snapshot("P021")],
    );

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let err = h
        .pipeline
        .run_pipeline_with_cancel(&pid("P021"), cancel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Cancelled {
            state: PipelineState::Stage1
        }
    ));

    let records = h.pipeline.list_for(&pid("P021")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].failure.as_ref().unwrap().kind,
        FailureKind::Cancelled
    );
    assert_eq!(h.pipeline.context_store().active_runs(), 0);
}

#[tokio::test]
async fn audit_write_failure_carries_the_run_failure() {
    let pipeline = TriagePipeline::builder(PipelineConfig::default())
        .judgment(Arc::new(
            ScriptedJudgment::new()
                .signal("declining", 0.2)
                .context("catastrophic", 0.2),
        ))
        .enrichment(Arc::new(StaticEnrichment::no_match()))
        .source(Arc::new(
            InMemoryPatientSource::new().with(sample_snapshot("P030")),
        ))
        .audit_log(Arc::new(FailingAuditLog))
        .build()
        .unwrap();

    match pipeline.run_pipeline(&pid("P030")).await.unwrap_err() {
        PipelineError::AuditWrite {
            outcome: Some(outcome),
            ..
        } => assert_eq!(outcome.kind(), FailureKind::Validation),
        other => panic!("expected audit write failure, got {other:?}"),
    }
}

#[tokio::test]
async fn audit_write_failure_withholds_the_decision() {
    let notifier = Arc::new(RecordingNotifier::new());
    let pipeline = TriagePipeline::builder(PipelineConfig::default())
        .judgment(Arc::new(
            ScriptedJudgment::new()
                .signal("declining", 0.2)
                .context("high", 0.2)
                .escalate(Urgency::Immediate, 0.9, 0.1),
        ))
        .enrichment(Arc::new(StaticEnrichment::no_match()))
        .source(Arc::new(
            InMemoryPatientSource::new().with(sample_snapshot("P031")),
        ))
        .audit_log(Arc::new(FailingAuditLog))
        .notifier(notifier.clone())
        .build()
        .unwrap();

    let err = pipeline.run_pipeline(&pid("P031")).await.unwrap_err();
    assert!(matches!(err, PipelineError::AuditWrite { outcome: None, .. }));
    assert!(pipeline.decision_history(&pid("P031")).is_empty());
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn audit_read_failure_is_reported_as_read_error() {
    let pipeline = TriagePipeline::builder(PipelineConfig::default())
        .judgment(Arc::new(ScriptedJudgment::new()))
        .enrichment(Arc::new(StaticEnrichment::no_match()))
        .source(Arc::new(InMemoryPatientSource::new()))
        .audit_log(Arc::new(FailingAuditLog))
        .build()
        .unwrap();

    let err = pipeline.list_for(&pid("P032")).await.unwrap_err();
    match &err {
        PipelineError::AuditRead { patient_id, reason } => {
            assert_eq!(patient_id, &pid("P032"));
            assert!(reason.contains("audit volume unavailable"));
        }
        other => panic!("expected audit read failure, got {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Internal);
    assert!(!err.is_transient());
}

// ── Runs that never start ───────────────────────────────────────────

#[tokio::test]
async fn unknown_patient_is_configuration_error_without_record() {
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new(),
        StaticEnrichment::no_match(),
        vec![],
    );

    let err = h.pipeline.run_pipeline(&pid("P404")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::PatientNotFound(_))
    ));
    assert!(h.audit.is_empty().unwrap());
    assert!(h.judgment.calls().is_empty());
}

#[tokio::test]
async fn empty_snapshot_is_configuration_error_without_record() {
    let empty = SignalSnapshot::builder("P040").age(50).build();
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new(),
        StaticEnrichment::no_match(),
        vec![empty],
    );

    let err = h.pipeline.run_pipeline(&pid("P040")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Configuration(ConfigurationError::EmptySnapshot(_))
    ));
    assert!(h.audit.is_empty().unwrap());
}

#[tokio::test]
async fn missing_age_is_configuration_error_without_record() {
    let ageless = SignalSnapshot::builder("P041")
        .reading(Reading::vital("heart_rate", 80.0, reading_at(0)))
        .reading(Reading::vital("heart_rate", 96.0, reading_at(60)))
        .build();
    let h = setup_harness(
        PipelineConfig::default(),
        ScriptedJudgment::new()
            .signal("declining", 0.3)
            .context("elevated", 0.35)
            .escalate(Urgency::Priority, 0.78, 0.2),
        StaticEnrichment::no_match(),
        vec![ageless],
    );

    let err = h.pipeline.run_pipeline(&pid("P041")).await.unwrap_err();
    match &err {
        PipelineError::Configuration(ConfigurationError::MissingStaticContext(id)) => {
            assert_eq!(id, &pid("P041"))
        }
        other => panic!("expected missing static context, got {other:?}"),
    }
    assert_eq!(err.kind(), FailureKind::Configuration);
    assert!(h.audit.is_empty().unwrap());
    assert!(h.judgment.calls().is_empty());
    assert!(h.notifier.notifications().is_empty());
    assert_eq!(h.pipeline.context_store().active_runs(), 0);
}

#[tokio::test]
async fn unavailable_source_is_upstream_error_without_record() {
    let audit = Arc::new(InMemoryAuditLog::new());
    let pipeline = TriagePipeline::builder(PipelineConfig::default())
        .judgment(Arc::new(ScriptedJudgment::new()))
        .enrichment(Arc::new(StaticEnrichment::no_match()))
        .source(Arc::new(InMemoryPatientSource::unavailable()))
        .audit_log(audit.clone())
        .build()
        .unwrap();

    let err = pipeline.run_pipeline(&pid("P001")).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::UpstreamUnavailable {
            capability: Capability::PatientSource,
            ..
        }
    ));
    assert!(audit.is_empty().unwrap());
}
