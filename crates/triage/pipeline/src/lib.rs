//! Clinical triage decision pipeline.
//!
//! Turns a patient's raw signals into an auditable escalation recommendation
//! through three ordered judgment stages:
//!
//! 1. **Signal interpretation** reads the time-ordered readings
//! 2. **Context adjustment** weighs that reading against static context
//! 3. **Escalation synthesis** produces the recommendation
//!
//! Between stages 2 and 3 the running uncertainty is checked against a
//! threshold; above it, a bounded enrichment lookup runs first and may lower
//! the uncertainty. Every run, successful or not, ends in exactly one audit
//! record.
//!
//! The pipeline never diagnoses or recommends treatment. It only prioritizes
//! clinical attention.

#![deny(unsafe_code)]

pub mod aggregator;
pub mod cancel;
pub mod config;
pub mod error;
pub mod executor;
pub mod gate;
pub mod judgment;
pub mod mocks;
pub mod notify;
pub mod run;
pub mod source;
pub mod stages;
pub mod telemetry;

pub use aggregator::{combine, UncertaintyAggregator};
pub use cancel::CancellationToken;
pub use config::{
    EnrichmentConfig, JudgmentConfig, LoggingConfig, PipelineConfig, RunConfig,
};
pub use error::{ConfigurationError, PipelineError};
pub use executor::{TriagePipeline, TriagePipelineBuilder};
pub use gate::{EnrichmentError, EnrichmentGate, EnrichmentLookup, GateDecision};
pub use judgment::{JudgmentBackend, JudgmentError, JudgmentRequest};
pub use notify::{Notification, NotificationKind, Notifier, TracingNotifier};
pub use run::RunContext;
pub use source::{PatientSource, SourceError};
pub use stages::{
    ContextAdjustmentInput, ContextAdjustmentStage, EscalationSynthesisInput,
    EscalationSynthesisStage, JudgmentStage, SignalInterpretationStage,
};
